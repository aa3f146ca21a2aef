//! Testing utilities and harness for Raptor

pub mod testing;

pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
}
