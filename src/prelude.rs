pub use crate::dispatch::{DispatchQueue, UploadToken};
pub use crate::res::prelude::*;
pub use crate::sched::prelude::*;
