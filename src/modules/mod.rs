pub mod clubs;
pub mod journal;
pub mod news;
pub mod strains;
