//! Data type families
//!
//! Name-based join rules only fire when both columns pass this gate: either
//! the type strings are identical or they fall into the same family.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeFamily {
    Integer,
    Numeric,
    Text,
    Temporal,
    Uuid,
}

impl TypeFamily {
    /// Classify a data type string such as `varchar(255)` or
    /// `timestamp with time zone`. Returns `None` for types outside the five
    /// families (json, bytea, arrays, ...).
    pub fn classify(data_type: &str) -> Option<Self> {
        let lowered = data_type.trim().to_lowercase();
        // Drop length/precision parameters: varchar(255), numeric(10,2)
        let base = lowered.split('(').next().unwrap_or("").trim();
        let head = base.split_whitespace().next().unwrap_or("");

        match head {
            "int" | "integer" | "smallint" | "bigint" | "serial" | "bigserial"
            | "smallserial" | "int2" | "int4" | "int8" => Some(TypeFamily::Integer),
            "numeric" | "decimal" | "real" | "double" | "float" | "float4" | "float8"
            | "money" => Some(TypeFamily::Numeric),
            "char" | "varchar" | "text" | "character" | "bpchar" | "citext" => {
                Some(TypeFamily::Text)
            }
            "date" | "timestamp" | "timestamptz" | "time" | "timetz" | "datetime" => {
                Some(TypeFamily::Temporal)
            }
            "uuid" => Some(TypeFamily::Uuid),
            _ => None,
        }
    }
}

/// Whether two columns may be joined at all
pub fn types_compatible(left: &str, right: &str) -> bool {
    if left.trim().eq_ignore_ascii_case(right.trim()) {
        return true;
    }
    match (TypeFamily::classify(left), TypeFamily::classify(right)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_families() {
        assert_eq!(TypeFamily::classify("bigint"), Some(TypeFamily::Integer));
        assert_eq!(TypeFamily::classify("SERIAL"), Some(TypeFamily::Integer));
        assert_eq!(TypeFamily::classify("numeric(10,2)"), Some(TypeFamily::Numeric));
        assert_eq!(TypeFamily::classify("double precision"), Some(TypeFamily::Numeric));
        assert_eq!(TypeFamily::classify("character varying"), Some(TypeFamily::Text));
        assert_eq!(TypeFamily::classify("varchar(255)"), Some(TypeFamily::Text));
        assert_eq!(
            TypeFamily::classify("timestamp with time zone"),
            Some(TypeFamily::Temporal)
        );
        assert_eq!(TypeFamily::classify("uuid"), Some(TypeFamily::Uuid));
        assert_eq!(TypeFamily::classify("jsonb"), None);
        assert_eq!(TypeFamily::classify("interval"), None);
    }

    #[test]
    fn test_compatibility() {
        assert!(types_compatible("int", "bigint"));
        assert!(types_compatible("text", "varchar(50)"));
        assert!(types_compatible("jsonb", "JSONB"));
        assert!(!types_compatible("int", "varchar"));
        assert!(!types_compatible("uuid", "text"));
        assert!(!types_compatible("jsonb", "json"));
    }
}
