mod cell;
mod cell_state;
mod handle;
mod outcome;
mod slot;
mod stream_cell;
mod stream_ext;
mod token;

pub use cell::*;
pub use cell_state::*;
pub use handle::*;
pub use outcome::*;
pub use slot::*;
pub use stream_cell::*;
pub use stream_ext::*;
pub use token::*;
