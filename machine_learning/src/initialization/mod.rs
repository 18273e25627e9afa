mod random;

pub use random::{normal, uniform, xavier_uniform};
