pub mod board_good;
pub mod board_new;
pub mod boards;
pub mod group_members;
pub mod groups;
pub mod members;
pub mod points;
pub mod scraps;
