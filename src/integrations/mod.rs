//! External service integrations.

pub mod checkers {
    pub use crate::checkers::*;
}

pub mod dialer_client {
    pub use crate::dialer_client::*;
}
