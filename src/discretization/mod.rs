pub mod boundary;
pub mod chebyshev;
pub mod grid2d;

pub use boundary::{end_rows, impose_dirichlet_rows, interior_mask, with_dirichlet_rows};
pub use chebyshev::{ChebyshevGrid, chebyshev_nodes, collocation_matrix};
pub use grid2d::ChebyshevGrid2d;
