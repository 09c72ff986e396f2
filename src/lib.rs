pub mod math {
    pub use sgpu_math::*;
}

pub mod log {
    pub use sgpu_log::*;
}

pub mod formats {
    pub use sgpu_formats::*;
}

pub mod pipeline {
    pub use sgpu_pipeline::*;
}

pub mod device {
    pub use sgpu_device::*;
}

pub mod prelude {
    pub use sgpu_device::prelude::*;
    pub use sgpu_formats::prelude::*;
    pub use sgpu_pipeline::prelude::*;
}
