mod proxy;

pub use proxy::proxy;
