use crate::driver::RawColumn;
use crate::field_type::ColumnType;

/// Metadata for one column of the active result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub name: String,
    pub column_type: ColumnType,
    pub display_size: Option<u32>,
    pub internal_size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    /// Normalized to a strict boolean; backends that cannot tell report `false`.
    pub null_ok: bool,
    pub flags: Option<u32>,
    pub charset: Option<u16>,
}

impl Description {
    #[must_use]
    pub fn from_raw(raw: &RawColumn) -> Self {
        Self {
            name: raw.name.clone(),
            column_type: ColumnType::from_code(raw.type_code),
            display_size: raw.display_size,
            internal_size: raw.internal_size,
            precision: raw.precision,
            scale: raw.scale,
            null_ok: raw.null_ok.unwrap_or(false),
            flags: raw.flags,
            charset: raw.charset,
        }
    }

    /// The wire type code this column was reported with.
    #[must_use]
    pub fn type_code(&self) -> u16 {
        self.column_type.code()
    }
}
