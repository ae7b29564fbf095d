pub mod batch;
pub mod idx;
pub mod in_memory;
pub mod synthetic;

pub use batch::{Batch, DataSource};
pub use idx::{load_idx_pair, parse_idx_pair, IdxData, IdxError};
pub use in_memory::InMemoryDataset;
pub use synthetic::gaussian_blobs;
