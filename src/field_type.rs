//! Wire type codes and the column type taxonomy they decode to.

pub const DECIMAL: u16 = 0;
pub const TINY: u16 = 1;
pub const SHORT: u16 = 2;
pub const LONG: u16 = 3;
pub const FLOAT: u16 = 4;
pub const DOUBLE: u16 = 5;
pub const NULL: u16 = 6;
pub const TIMESTAMP: u16 = 7;
pub const LONGLONG: u16 = 8;
pub const INT24: u16 = 9;
pub const DATE: u16 = 10;
pub const TIME: u16 = 11;
pub const DATETIME: u16 = 12;
pub const YEAR: u16 = 13;
pub const NEWDATE: u16 = 14;
pub const VARCHAR: u16 = 15;
pub const BIT: u16 = 16;
pub const JSON: u16 = 245;
pub const NEWDECIMAL: u16 = 246;
pub const ENUM: u16 = 247;
pub const SET: u16 = 248;
pub const TINY_BLOB: u16 = 249;
pub const MEDIUM_BLOB: u16 = 250;
pub const LONG_BLOB: u16 = 251;
pub const BLOB: u16 = 252;
pub const VAR_STRING: u16 = 253;
pub const STRING: u16 = 254;
pub const GEOMETRY: u16 = 255;

pub const CHAR: u16 = TINY;
pub const INTERVAL: u16 = ENUM;
pub const BOOL: u16 = TINY;

// Extended types, reported only when the server has extended type metadata enabled.
pub const BSON: u16 = 1001;
pub const FLOAT32_VECTOR_JSON: u16 = 2001;
pub const FLOAT64_VECTOR_JSON: u16 = 2002;
pub const INT8_VECTOR_JSON: u16 = 2003;
pub const INT16_VECTOR_JSON: u16 = 2004;
pub const INT32_VECTOR_JSON: u16 = 2005;
pub const INT64_VECTOR_JSON: u16 = 2006;
pub const FLOAT32_VECTOR: u16 = 3001;
pub const FLOAT64_VECTOR: u16 = 3002;
pub const INT8_VECTOR: u16 = 3003;
pub const INT16_VECTOR: u16 = 3004;
pub const INT32_VECTOR: u16 = 3005;
pub const INT64_VECTOR: u16 = 3006;

/// Column flag bits reported alongside the type code.
pub mod flags {
    pub const NOT_NULL: u32 = 1;
    pub const PRI_KEY: u32 = 2;
    pub const UNIQUE_KEY: u32 = 4;
    pub const BLOB: u32 = 16;
    pub const UNSIGNED: u32 = 32;
    pub const BINARY: u32 = 128;
    pub const ENUM: u32 = 256;
    pub const SET: u32 = 2048;
}

/// Character set id the server reports for binary (non-text) columns.
pub const BINARY_CHARSET: u16 = 63;

/// Semantic column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Decimal,
    NewDecimal,
    Tiny,
    Short,
    Long,
    LongLong,
    Int24,
    Float,
    Double,
    Null,
    Timestamp,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    Varchar,
    Bit,
    Json,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
    Bson,
    Float32VectorJson,
    Float64VectorJson,
    Int8VectorJson,
    Int16VectorJson,
    Int32VectorJson,
    Int64VectorJson,
    Float32Vector,
    Float64Vector,
    Int8Vector,
    Int16Vector,
    Int32Vector,
    Int64Vector,
    /// A code this registry does not know.
    Unknown(u16),
}

const REGISTRY: &[(u16, ColumnType, &str)] = &[
    (DECIMAL, ColumnType::Decimal, "DECIMAL"),
    (TINY, ColumnType::Tiny, "TINY"),
    (SHORT, ColumnType::Short, "SHORT"),
    (LONG, ColumnType::Long, "LONG"),
    (FLOAT, ColumnType::Float, "FLOAT"),
    (DOUBLE, ColumnType::Double, "DOUBLE"),
    (NULL, ColumnType::Null, "NULL"),
    (TIMESTAMP, ColumnType::Timestamp, "TIMESTAMP"),
    (LONGLONG, ColumnType::LongLong, "LONGLONG"),
    (INT24, ColumnType::Int24, "INT24"),
    (DATE, ColumnType::Date, "DATE"),
    (TIME, ColumnType::Time, "TIME"),
    (DATETIME, ColumnType::DateTime, "DATETIME"),
    (YEAR, ColumnType::Year, "YEAR"),
    (NEWDATE, ColumnType::NewDate, "NEWDATE"),
    (VARCHAR, ColumnType::Varchar, "VARCHAR"),
    (BIT, ColumnType::Bit, "BIT"),
    (JSON, ColumnType::Json, "JSON"),
    (NEWDECIMAL, ColumnType::NewDecimal, "NEWDECIMAL"),
    (ENUM, ColumnType::Enum, "ENUM"),
    (SET, ColumnType::Set, "SET"),
    (TINY_BLOB, ColumnType::TinyBlob, "TINY_BLOB"),
    (MEDIUM_BLOB, ColumnType::MediumBlob, "MEDIUM_BLOB"),
    (LONG_BLOB, ColumnType::LongBlob, "LONG_BLOB"),
    (BLOB, ColumnType::Blob, "BLOB"),
    (VAR_STRING, ColumnType::VarString, "VAR_STRING"),
    (STRING, ColumnType::String, "STRING"),
    (GEOMETRY, ColumnType::Geometry, "GEOMETRY"),
    (BSON, ColumnType::Bson, "BSON"),
    (FLOAT32_VECTOR_JSON, ColumnType::Float32VectorJson, "FLOAT32_VECTOR_JSON"),
    (FLOAT64_VECTOR_JSON, ColumnType::Float64VectorJson, "FLOAT64_VECTOR_JSON"),
    (INT8_VECTOR_JSON, ColumnType::Int8VectorJson, "INT8_VECTOR_JSON"),
    (INT16_VECTOR_JSON, ColumnType::Int16VectorJson, "INT16_VECTOR_JSON"),
    (INT32_VECTOR_JSON, ColumnType::Int32VectorJson, "INT32_VECTOR_JSON"),
    (INT64_VECTOR_JSON, ColumnType::Int64VectorJson, "INT64_VECTOR_JSON"),
    (FLOAT32_VECTOR, ColumnType::Float32Vector, "FLOAT32_VECTOR"),
    (FLOAT64_VECTOR, ColumnType::Float64Vector, "FLOAT64_VECTOR"),
    (INT8_VECTOR, ColumnType::Int8Vector, "INT8_VECTOR"),
    (INT16_VECTOR, ColumnType::Int16Vector, "INT16_VECTOR"),
    (INT32_VECTOR, ColumnType::Int32Vector, "INT32_VECTOR"),
    (INT64_VECTOR, ColumnType::Int64Vector, "INT64_VECTOR"),
];

impl ColumnType {
    /// Decode a wire type code.
    #[must_use]
    pub fn from_code(code: u16) -> ColumnType {
        REGISTRY
            .iter()
            .find(|(c, _, _)| *c == code)
            .map_or(ColumnType::Unknown(code), |(_, ty, _)| *ty)
    }

    /// Look a type up by its registry name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<ColumnType> {
        REGISTRY
            .iter()
            .find(|(_, _, n)| n.eq_ignore_ascii_case(name))
            .map(|(_, ty, _)| *ty)
    }

    #[must_use]
    pub fn code(self) -> u16 {
        if let ColumnType::Unknown(code) = self {
            return code;
        }
        REGISTRY
            .iter()
            .find(|(_, ty, _)| *ty == self)
            .map_or(u16::MAX, |(c, _, _)| *c)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(_, ty, _)| *ty == self)
            .map_or("UNKNOWN", |(_, _, n)| *n)
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnType::Tiny
                | ColumnType::Short
                | ColumnType::Long
                | ColumnType::LongLong
                | ColumnType::Int24
                | ColumnType::Year
        )
    }

    #[must_use]
    pub fn is_decimal(self) -> bool {
        matches!(self, ColumnType::Decimal | ColumnType::NewDecimal)
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, ColumnType::Float | ColumnType::Double)
    }

    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ColumnType::Timestamp
                | ColumnType::Date
                | ColumnType::Time
                | ColumnType::DateTime
                | ColumnType::NewDate
        )
    }

    #[must_use]
    pub fn is_string(self) -> bool {
        matches!(
            self,
            ColumnType::Varchar | ColumnType::VarString | ColumnType::String | ColumnType::Enum
        )
    }

    #[must_use]
    pub fn is_blob(self) -> bool {
        matches!(
            self,
            ColumnType::TinyBlob
                | ColumnType::MediumBlob
                | ColumnType::LongBlob
                | ColumnType::Blob
                | ColumnType::Geometry
                | ColumnType::Bson
        )
    }

    #[must_use]
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            ColumnType::Float32VectorJson
                | ColumnType::Float64VectorJson
                | ColumnType::Int8VectorJson
                | ColumnType::Int16VectorJson
                | ColumnType::Int32VectorJson
                | ColumnType::Int64VectorJson
                | ColumnType::Float32Vector
                | ColumnType::Float64Vector
                | ColumnType::Int8Vector
                | ColumnType::Int16Vector
                | ColumnType::Int32Vector
                | ColumnType::Int64Vector
        )
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Unknown(code) => write!(f, "UNKNOWN({code})"),
            other => f.write_str(other.name()),
        }
    }
}
