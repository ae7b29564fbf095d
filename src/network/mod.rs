pub mod model;
pub mod network;
pub mod spec;

pub use model::{Gradients, Model, StateDict};
pub use network::Mlp;
pub use spec::{LayerSpec, NetworkSpec};
