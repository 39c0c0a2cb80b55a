//! Standard normal distribution helpers.

use std::f64::consts::SQRT_2;

// Chebyshev coefficients of erfc on [0, inf), relative error below 1e-13.
const ERFC_COEFFICIENTS: [f64; 28] = [
    -1.302_653_719_781_709_4,
    6.419_697_923_564_902_6e-1,
    1.947_647_320_418_583_6e-2,
    -9.561_514_786_808_631e-3,
    -9.465_953_444_820_36e-4,
    3.668_394_978_527_61e-4,
    4.252_332_480_690_7e-5,
    -2.027_857_811_253_4e-5,
    -1.624_290_004_647e-6,
    1.303_655_835_580e-6,
    1.562_644_172_2e-8,
    -8.523_809_591_5e-8,
    6.529_054_439e-9,
    5.059_343_495e-9,
    -9.913_641_56e-10,
    -2.273_651_22e-10,
    9.646_791_1e-11,
    2.394_038e-12,
    -6.886_027e-12,
    8.944_87e-13,
    3.130_92e-13,
    -1.127_08e-13,
    3.81e-16,
    7.106e-15,
    -1.523e-15,
    -9.4e-17,
    1.21e-16,
    -2.8e-17,
];

fn erfc_nonnegative(z: f64) -> f64 {
    let t = 2.0 / (2.0 + z);
    let ty = 4.0 * t - 2.0;
    let mut d = 0.0;
    let mut dd = 0.0;
    for coefficient in ERFC_COEFFICIENTS.iter().skip(1).rev() {
        let previous = d;
        d = ty * d - dd + coefficient;
        dd = previous;
    }
    t * (-z * z + 0.5 * (ERFC_COEFFICIENTS[0] + ty * d) - dd).exp()
}

/// `P(X <= x)` for `X ~ N(0, 1)`. NaN propagates.
pub fn standard_normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x < 0.0 {
        0.5 * erfc_nonnegative(-x / SQRT_2)
    } else {
        1.0 - 0.5 * erfc_nonnegative(x / SQRT_2)
    }
}

/// Probability that a Gaussian with standard deviation `scale` exceeds its
/// mean minus `margin`, i.e. `Φ(margin / scale)`.
///
/// A zero scale is a point mass: 1, 0, or ½ for a positive, negative, or zero
/// margin. A NaN scale yields NaN, which no `gamma` threshold accepts.
pub fn exceedance_probability(margin: f64, scale: f64) -> f64 {
    if scale.is_nan() {
        return f64::NAN;
    }
    if scale > 0.0 {
        return standard_normal_cdf(margin / scale);
    }
    if margin > 0.0 {
        1.0
    } else if margin < 0.0 {
        0.0
    } else if margin == 0.0 {
        0.5
    } else {
        f64::NAN
    }
}
