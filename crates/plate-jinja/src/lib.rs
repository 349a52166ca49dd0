mod catalog;
mod codec;
mod config;
mod export;
mod node;
mod popup;
mod registry;
mod session;
mod upload;

pub use crate::catalog::*;
pub use crate::codec::*;
pub use crate::config::*;
pub use crate::export::*;
pub use crate::node::*;
pub use crate::popup::*;
pub use crate::registry::*;
pub use crate::session::*;
pub use crate::upload::*;
