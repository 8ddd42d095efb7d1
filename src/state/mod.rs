pub mod board;

pub use board::BoardStore;
