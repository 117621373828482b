use std::fmt;

use tensor::{FrameworkDType, TensorError};
use thiserror::Error;

/// Device kinds a kernel can be registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceType::Cpu => "CPU",
            DeviceType::Gpu => "GPU",
        })
    }
}

/// Element type of one argument: bound to the op's type attribute, or fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeConstraint {
    Attr(&'static str),
    Fixed(FrameworkDType),
}

#[derive(Debug, Clone)]
pub struct ArgDef {
    pub name: &'static str,
    pub ty:   TypeConstraint,
}

impl ArgDef {
    pub const fn attr(name: &'static str, attr: &'static str) -> Self {
        Self { name, ty: TypeConstraint::Attr(attr) }
    }

    pub const fn fixed(name: &'static str, dtype: FrameworkDType) -> Self {
        Self { name, ty: TypeConstraint::Fixed(dtype) }
    }
}

/// A named type attribute and the element types it may take.
#[derive(Debug, Clone)]
pub struct TypeAttr {
    pub name:    &'static str,
    pub allowed: Vec<FrameworkDType>,
}

/// Output shapes from input shapes
pub type ShapeFn = fn(&[&[usize]]) -> Vec<Vec<usize>>;

/// The full signature of an operation:
/// - `name`
/// - its type attribute and the element types it accepts
/// - typed inputs and outputs
/// - the device kinds it has kernels for
/// - shape inference and doc text
#[derive(Debug, Clone)]
pub struct OpSignature {
    pub name:      &'static str,
    pub type_attr: TypeAttr,
    pub inputs:    Vec<ArgDef>,
    pub outputs:   Vec<ArgDef>,
    pub devices:   Vec<DeviceType>,
    pub shape_fn:  ShapeFn,
    pub doc:       &'static str,
}

/// Errors during signature validation
#[derive(Debug, Error)]
pub enum OpError {
    #[error("no op registered under {0:?}")]
    UnknownOp(String),
    #[error("{op} takes {expected} inputs, got {found}")]
    ArityMismatch { op: String, expected: usize, found: usize },
    #[error("{op} input {index} must be one of {expected:?}, got {found}")]
    DtypeMismatch { op: String, index: usize, expected: Vec<FrameworkDType>, found: FrameworkDType },
    #[error("no input of {op} binds type attribute {attr}")]
    UnboundTypeAttr { op: String, attr: &'static str },
    #[error("{op} has no {device} kernel")]
    UnsupportedDevice { op: String, device: DeviceType },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Trait to implement for each Op to work with inventory
pub trait RegistrationInfo {
    /// Unique name for the operation
    const NAME: &'static str;
}
