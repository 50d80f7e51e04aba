//! Colored travelers roam a 2-D grid, spending a bounded, shared ink supply
//! to paint the cells they visit, while producer threads replenish the ink.

pub mod grid;
pub mod ink;
pub mod producer;
pub mod render;
pub mod sim;
pub mod traveler;
