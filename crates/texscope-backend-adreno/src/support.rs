//! Adreno texture support matrix.

use texscope_backend_core::TextureSupport;
use texscope_ir::{Attrs, Conv2dAttrs};

/// Operator layouts Adreno GPUs read efficiently from texture memory.
#[derive(Debug)]
pub struct AdrenoTextureSupport;

/// Kernel layouts accepted by a plain NCHW4c convolution.
const CONV2D_NCHW4C_KERNELS: &[&str] = &["OIHW4o"];

/// Kernel layouts accepted by a plain NHWC4c convolution.
const CONV2D_NHWC4C_KERNELS: &[&str] = &["HWOI4o", "HWIO4o", "OIHW4o"];

const WINOGRAD_DATA_LAYOUTS: &[&str] = &["NCHW4c", "NHWC4c"];
const WINOGRAD_KERNEL_LAYOUTS: &[&str] = &["OIHW4o", "HWIO4o"];

const POOL_LAYOUT: &str = "NCHW4c";

fn conv2d_supported(a: &Conv2dAttrs) -> bool {
    let kernels = match a.data_layout.as_str() {
        "NCHW4c" => CONV2D_NCHW4C_KERNELS,
        "NHWC4c" => CONV2D_NHWC4C_KERNELS,
        _ => return false,
    };
    kernels.contains(&a.kernel_layout.as_str())
}

fn winograd_supported(a: &Conv2dAttrs) -> bool {
    WINOGRAD_DATA_LAYOUTS.contains(&a.data_layout.as_str())
        && WINOGRAD_KERNEL_LAYOUTS.contains(&a.kernel_layout.as_str())
}

impl TextureSupport for AdrenoTextureSupport {
    fn name(&self) -> &str {
        "adreno"
    }

    fn supports_texture(&self, attrs: &Attrs) -> bool {
        match attrs {
            Attrs::Conv2d(a) => conv2d_supported(a),
            Attrs::Conv2dWinograd(a) => winograd_supported(a),
            Attrs::GlobalPool2d(p) | Attrs::MaxPool2d(p) | Attrs::AvgPool2d(p) => {
                p.layout == POOL_LAYOUT
            }
            Attrs::None => false,
        }
    }
}
