pub mod advdiff;
pub mod burgers;
pub mod convection;
pub mod manufactured;

pub use convection::{GridResiduals, NaturalConvection};
pub use manufactured::{Manufactured, ManufacturedForcing, Transport};
