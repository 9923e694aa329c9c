//! Domain types: assets, orders, trades, positions and books.

pub mod asset;
pub mod book;
pub mod order;
pub mod position;
pub mod trade;

pub use asset::{Asset, AssetError, AssetHandle, AssetRegistry};
pub use book::{Book, BookError, BookSnapshot};
pub use order::{Order, OrderStatus, ProcessedOrder, RejectReason, SizeType};
pub use position::Position;
pub use trade::Trade;
