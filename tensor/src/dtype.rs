use std::fmt;

/// Element type tags of the host framework.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameworkDType {
    Float,
    Double,
    Half,
    BFloat16,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Bool,
    Complex64,
    String,
}

impl FrameworkDType {
    /// Bytes per element; `None` for variable-length types
    pub fn size_in_bytes(self) -> Option<usize> {
        use FrameworkDType::*;
        match self {
            Int8 | UInt8 | Bool => Some(1),
            Half | BFloat16 | Int16 | UInt16 => Some(2),
            Float | Int32 | UInt32 => Some(4),
            Double | Int64 | UInt64 | Complex64 => Some(8),
            String => None,
        }
    }
}

impl fmt::Display for FrameworkDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameworkDType::Float => "float32",
            FrameworkDType::Double => "float64",
            FrameworkDType::Half => "float16",
            FrameworkDType::BFloat16 => "bfloat16",
            FrameworkDType::Int8 => "int8",
            FrameworkDType::UInt8 => "uint8",
            FrameworkDType::Int16 => "int16",
            FrameworkDType::UInt16 => "uint16",
            FrameworkDType::Int32 => "int32",
            FrameworkDType::UInt32 => "uint32",
            FrameworkDType::Int64 => "int64",
            FrameworkDType::UInt64 => "uint64",
            FrameworkDType::Bool => "bool",
            FrameworkDType::Complex64 => "complex64",
            FrameworkDType::String => "string",
        };
        f.write_str(name)
    }
}

/// Rust element types the framework can build tensors from
pub trait Element: bytemuck::Pod {
    const DTYPE: FrameworkDType;
}

macro_rules! element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl Element for $ty { const DTYPE: FrameworkDType = FrameworkDType::$tag; })*
    };
}

element! {
    f32 => Float,
    f64 => Double,
    half::f16 => Half,
    half::bf16 => BFloat16,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
}
