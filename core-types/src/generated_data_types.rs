/// Element types understood by the communication engine.
/// Discriminants are the engine's wire tags.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32 = 0,
    Float64 = 1,
    Float16 = 2,
    UInt8 = 3,
    Int32 = 4,
    Int8 = 5,
    Int64 = 6,
    UInt16 = 7,
    Int16 = 8,
    Bool = 9,
    Byte = 10,
}

impl DataType {
    /// Every engine type, in tag order
    pub const ALL: [DataType; 11] = [
        DataType::Float32,
        DataType::Float64,
        DataType::Float16,
        DataType::UInt8,
        DataType::Int32,
        DataType::Int8,
        DataType::Int64,
        DataType::UInt16,
        DataType::Int16,
        DataType::Bool,
        DataType::Byte,
    ];

    /// Size of one element, in bytes
    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::Float32 => 4,
            DataType::Float64 => 8,
            DataType::Float16 => 2,
            DataType::UInt8 => 1,
            DataType::Int32 => 4,
            DataType::Int8 => 1,
            DataType::Int64 => 8,
            DataType::UInt16 => 2,
            DataType::Int16 => 2,
            DataType::Bool => 1,
            DataType::Byte => 1,
        }
    }

    /// Engine wire tag
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DataType::Float32),
            1 => Some(DataType::Float64),
            2 => Some(DataType::Float16),
            3 => Some(DataType::UInt8),
            4 => Some(DataType::Int32),
            5 => Some(DataType::Int8),
            6 => Some(DataType::Int64),
            7 => Some(DataType::UInt16),
            8 => Some(DataType::Int16),
            9 => Some(DataType::Bool),
            10 => Some(DataType::Byte),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::Float16 => "Float16",
            DataType::UInt8 => "UInt8",
            DataType::Int32 => "Int32",
            DataType::Int8 => "Int8",
            DataType::Int64 => "Int64",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::Bool => "Bool",
            DataType::Byte => "Byte",
        }
    }
}

/// Marker-trait so we can go from T to DataType
pub trait Element: bytemuck::Pod {
    const DTYPE: DataType;

    /// Element-wise reduction used by the engine (integers wrap)
    fn add(a: Self, b: Self) -> Self;
}

impl Element for f32 {
    const DTYPE: DataType = DataType::Float32;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a + b }
}

impl Element for f64 {
    const DTYPE: DataType = DataType::Float64;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a + b }
}

impl Element for half::f16 {
    const DTYPE: DataType = DataType::Float16;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a + b }
}

impl Element for u8 {
    const DTYPE: DataType = DataType::UInt8;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a.wrapping_add(b) }
}

impl Element for i32 {
    const DTYPE: DataType = DataType::Int32;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a.wrapping_add(b) }
}

impl Element for i8 {
    const DTYPE: DataType = DataType::Int8;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a.wrapping_add(b) }
}

impl Element for i64 {
    const DTYPE: DataType = DataType::Int64;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a.wrapping_add(b) }
}

impl Element for u16 {
    const DTYPE: DataType = DataType::UInt16;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a.wrapping_add(b) }
}

impl Element for i16 {
    const DTYPE: DataType = DataType::Int16;
    #[inline]
    fn add(a: Self, b: Self) -> Self { a.wrapping_add(b) }
}
