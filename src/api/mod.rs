// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod postback_handler {
    pub use crate::postback_handler::*;
}

pub mod auth {
    pub use crate::auth::*;
}
