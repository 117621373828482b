mod push_pull;

pub use push_pull::{PushPullKernel, PushPullOp};
