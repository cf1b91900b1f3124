pub mod clicks;
