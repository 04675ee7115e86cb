pub mod baltics_rss;
pub mod euronext;
pub mod omx;
