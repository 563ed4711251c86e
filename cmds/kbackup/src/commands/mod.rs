pub mod backup;
pub mod kinds;

pub mod util;
