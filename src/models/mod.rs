pub mod content;
pub mod episode;
pub mod fetch;
pub mod proxy;

pub use content::*;
pub use episode::*;
pub use fetch::*;
pub use proxy::*;
