pub mod csv_writer;
pub mod field_dump;
pub mod summary;
pub mod validation;

pub use field_dump::{CaseFields, VorticityStreamfunction, write_stacked_fields, write_tecplot};
pub use summary::RunSummary;
pub use validation::{
    ErrorReport, evaluate_batch, evaluate_surrogate, mean_relative_error, per_variable_errors,
    projection_error, reconstruct, relative_error,
};
