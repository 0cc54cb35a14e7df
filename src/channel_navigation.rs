pub mod channel_table;
pub mod navigator;

pub use channel_table::ChannelTable;
pub use navigator::{ChannelNavigator, Direction, NavOutcome, NavigationCursor};
