//! # Convolution Shape Utilities
//!
//! Utilities for predicting the output shape of convolution and pooling operations.
//!
//! Pooling windows follow the same arithmetic as convolutions with `dilation = 1`.

use burn::nn::PaddingConfig2d;

/// Predict the output size of a 1D convolution operation.
///
/// ```text
/// out_size = floor( ((in_size + 2*padding - dilation*(kernel_size-1) - 1) / stride) + 1 )
/// ```
///
/// # Reference
///
/// - [conv_arithmetic diagram](https://github.com/vdumoulin/conv_arithmetic/blob/master/README.md)
/// - [pytorch conv1d](https://docs.pytorch.org/docs/stable/generated/torch.nn.Conv1d.html)
///
/// # Arguments
///
/// - `input_size`: The input dimension size.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the convolution, must be > 0.
/// - `padding`: The padding of the convolution, added evenly to both sides of the input.
/// - `dilation`: The dilation of the convolution, must be > 0.
///
/// # Returns
///
/// `Some(out_size)`; or `None` if the input is empty, or the window does not
/// fit in the padded input.
pub fn maybe_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    assert!(kernel_size > 0);
    assert!(stride > 0);
    assert!(dilation > 0);

    if input_size == 0 {
        return None;
    }

    let padded = input_size + 2 * padding;
    let window = dilation * (kernel_size - 1) + 1;

    padded.checked_sub(window).map(|slack| slack / stride + 1)
}

/// Predict the output size of a 1D convolution operation.
///
/// This is the ``panic``-ing variant of [`maybe_conv1d_output_size`].
///
/// # Panics
///
/// If the window does not fit in the padded input.
pub fn expect_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    match maybe_conv1d_output_size(input_size, kernel_size, stride, padding, dilation) {
        Some(x) => x,
        None => panic!(
            "No legal output size for conv1d with:\n input_size:{input_size}\n kernel_size:{kernel_size}\n stride:{stride}\n dilation:{dilation}\n padding:{padding}",
        ),
    }
}

/// Predict the output resolution of a 2D convolution or pooling operation.
///
/// # Arguments
///
/// - `input_resolution`: ``[in_height, in_width]``.
/// - `kernel_size`: ``[kernel_height, kernel_width]``.
/// - `stride`: ``[stride_height, stride_width]``.
/// - `padding`: ``[pad_height, pad_width]``, applied to both sides.
/// - `dilation`: ``[dilation_height, dilation_width]``.
///
/// # Returns
///
/// `Some([out_height, out_width])`; or `None` if either dimension collapses.
pub fn maybe_conv2d_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
) -> Option<[usize; 2]> {
    Some([
        maybe_conv1d_output_size(
            input_resolution[0],
            kernel_size[0],
            stride[0],
            padding[0],
            dilation[0],
        )?,
        maybe_conv1d_output_size(
            input_resolution[1],
            kernel_size[1],
            stride[1],
            padding[1],
            dilation[1],
        )?,
    ])
}

/// Resolve a [`PaddingConfig2d`] to explicit ``[pad_height, pad_width]`` values.
///
/// `Same` padding is resolved for stride 1 (the only stride ``burn`` accepts it with).
pub fn explicit_padding(
    padding: &PaddingConfig2d,
    kernel_size: [usize; 2],
    dilation: [usize; 2],
) -> [usize; 2] {
    match padding {
        PaddingConfig2d::Valid => [0, 0],
        PaddingConfig2d::Explicit(height, width) => [*height, *width],
        PaddingConfig2d::Same => [
            dilation[0] * (kernel_size[0] - 1) / 2,
            dilation[1] * (kernel_size[1] - 1) / 2,
        ],
    }
}

/// Ceiling division of a resolution by a stride.
///
/// This is the output resolution of a `kernel=1, padding=0` or a
/// `kernel=3, padding=1` convolution with the given stride.
pub fn stride_ceil_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    assert!(stride > 0, "stride must be > 0");
    input_resolution.map(|x| x.div_ceil(stride))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv1d_output_size() {
        // 8x8 kernel, stride 2, padding 3.
        assert_eq!(maybe_conv1d_output_size(224, 8, 2, 3, 1), Some(112));
        // 3x3 kernel, stride 2, no padding.
        assert_eq!(maybe_conv1d_output_size(56, 3, 2, 0, 1), Some(27));
        // dilated.
        assert_eq!(maybe_conv1d_output_size(10, 3, 1, 0, 2), Some(6));

        assert_eq!(maybe_conv1d_output_size(2, 3, 1, 0, 1), None);
        assert_eq!(maybe_conv1d_output_size(3, 3, 1, 0, 1), Some(1));

        // Padding does not rescue an empty input.
        assert_eq!(maybe_conv1d_output_size(0, 1, 1, 0, 1), None);
        assert_eq!(maybe_conv1d_output_size(0, 8, 2, 3, 1), None);
    }

    #[test]
    #[should_panic(expected = "No legal output size for conv1d")]
    fn test_expect_conv1d_output_size_panics() {
        expect_conv1d_output_size(2, 10, 1, 0, 1);
    }

    #[test]
    fn test_conv2d_output_resolution() {
        assert_eq!(
            maybe_conv2d_output_resolution([112, 60], [4, 4], [2, 2], [1, 1], [1, 1]),
            Some([56, 30])
        );
        assert_eq!(
            maybe_conv2d_output_resolution([8, 2], [3, 3], [1, 1], [0, 0], [1, 1]),
            None
        );
    }

    #[test]
    fn test_explicit_padding() {
        assert_eq!(
            explicit_padding(&PaddingConfig2d::Valid, [3, 3], [1, 1]),
            [0, 0]
        );
        assert_eq!(
            explicit_padding(&PaddingConfig2d::Explicit(3, 1), [8, 8], [1, 1]),
            [3, 1]
        );
        assert_eq!(
            explicit_padding(&PaddingConfig2d::Same, [3, 5], [1, 2]),
            [1, 4]
        );
    }

    #[test]
    fn test_stride_ceil_output_resolution() {
        assert_eq!(stride_ceil_output_resolution([13, 12], 1), [13, 12]);
        assert_eq!(stride_ceil_output_resolution([13, 12], 2), [7, 6]);
        assert_eq!(stride_ceil_output_resolution([7, 1], 2), [4, 1]);
    }
}
