pub mod config;
pub mod list;
pub mod map;
pub(crate) mod node;
pub mod observable;
pub mod project;
pub mod sync;
pub mod value;

pub use config::*;
pub use list::ObservableList;
pub use map::ObservableMap;
pub use observable::{NotifyBlock, Signal, Subscription};
pub use value::{ContainerError, ContainerId, Value};
