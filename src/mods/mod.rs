pub mod follow;
pub mod live;
pub mod record;
