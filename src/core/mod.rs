// Domain-layer modules and shared errors/models
pub mod engine {
    pub use crate::engine::*;
}

pub mod pre_ping {
    pub use crate::pre_ping::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
