//! Display color to perceptual coordinate conversion
//!
//! Pixels are linearized with the display transfer curve, taken to CIE XYZ
//! under the working white point, Bradford-adapted to Illuminant C (the
//! illuminant the Munsell renotation is referenced to) and expressed as
//! CIELAB relative to Illuminant C. Euclidean distance in that space is the
//! CIE76 color difference used by the matcher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

type Matrix3 = [[f64; 3]; 3];

/// sRGB pixel as delivered by a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from integer channels, clamping each into [0, 255]
    pub fn from_clamped(r: i64, g: i64, b: i64) -> Self {
        let clamp = |c: i64| c.clamp(0, 255) as u8;
        Self::new(clamp(r), clamp(g), clamp(b))
    }

    /// Build from normalized channels, clamping each into [0, 1].
    /// NaN is treated as 0.
    pub fn from_unit(r: f64, g: f64, b: f64) -> Self {
        let to_byte = |c: f64| (clamp_unit(c) * 255.0).round() as u8;
        Self::new(to_byte(r), to_byte(g), to_byte(b))
    }

    /// Parse `#RRGGBB` or `RRGGBB`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[inline]
fn clamp_unit(c: f64) -> f64 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

/// CIE XYZ tristimulus values, Y normalized to 1.0 for the white
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Xyz {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// From chromaticity `(x, y)` and luminance factor `big_y` (1.0 = white).
    /// A zero `y` collapses to black.
    pub fn from_xyy(x: f64, y: f64, big_y: f64) -> Self {
        if y <= 0.0 {
            return Self::new(0.0, 0.0, 0.0);
        }
        Self::new(x * big_y / y, big_y, (1.0 - x - y) * big_y / y)
    }

    fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// CIELAB coordinate relative to Illuminant C
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

const LAB_EPSILON: f64 = 216.0 / 24389.0;
const LAB_KAPPA: f64 = 24389.0 / 27.0;

impl Lab {
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    pub fn from_xyz(xyz: Xyz, white: Xyz) -> Self {
        let f = |t: f64| {
            if t > LAB_EPSILON {
                t.cbrt()
            } else {
                (LAB_KAPPA * t + 16.0) / 116.0
            }
        };
        let fx = f(xyz.x / white.x);
        let fy = f(xyz.y / white.y);
        let fz = f(xyz.z / white.z);

        Self {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }

    pub fn to_xyz(&self, white: Xyz) -> Xyz {
        let fy = (self.l + 16.0) / 116.0;
        let fx = fy + self.a / 500.0;
        let fz = fy - self.b / 200.0;
        let finv = |t: f64| {
            let t3 = t * t * t;
            if t3 > LAB_EPSILON {
                t3
            } else {
                (116.0 * t - 16.0) / LAB_KAPPA
            }
        };
        let yr = if self.l > LAB_KAPPA * LAB_EPSILON {
            fy * fy * fy
        } else {
            self.l / LAB_KAPPA
        };

        Xyz::new(finv(fx) * white.x, yr * white.y, finv(fz) * white.z)
    }

    /// Distance from the achromatic axis (C*ab)
    #[inline]
    pub fn chroma(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Squared distance to another coordinate
    #[inline]
    pub fn distance_squared(&self, other: &Lab) -> f64 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        dl * dl + da * da + db * db
    }

    #[inline]
    pub fn distance(&self, other: &Lab) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// CIE standard illuminants usable as the working white point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum WhitePoint {
    A,
    C,
    D50,
    D55,
    D65,
    D75,
    E,
    F2,
    F7,
    F11,
}

impl WhitePoint {
    pub const ALL: [WhitePoint; 10] = [
        WhitePoint::A,
        WhitePoint::C,
        WhitePoint::D50,
        WhitePoint::D55,
        WhitePoint::D65,
        WhitePoint::D75,
        WhitePoint::E,
        WhitePoint::F2,
        WhitePoint::F7,
        WhitePoint::F11,
    ];

    /// Tristimulus values of the white, CIE 1931 2 degree observer
    pub fn xyz(self) -> Xyz {
        match self {
            WhitePoint::A => Xyz::new(1.09850, 1.0, 0.35585),
            WhitePoint::C => Xyz::new(0.98074, 1.0, 1.18232),
            WhitePoint::D50 => Xyz::new(0.96422, 1.0, 0.82521),
            WhitePoint::D55 => Xyz::new(0.95682, 1.0, 0.92149),
            WhitePoint::D65 => Xyz::new(0.95047, 1.0, 1.08883),
            WhitePoint::D75 => Xyz::new(0.94972, 1.0, 1.22638),
            WhitePoint::E => Xyz::new(1.0, 1.0, 1.0),
            WhitePoint::F2 => Xyz::new(0.99186, 1.0, 0.67393),
            WhitePoint::F7 => Xyz::new(0.95041, 1.0, 1.08747),
            WhitePoint::F11 => Xyz::new(1.00962, 1.0, 0.64350),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WhitePoint::A => "A",
            WhitePoint::C => "C",
            WhitePoint::D50 => "D50",
            WhitePoint::D55 => "D55",
            WhitePoint::D65 => "D65",
            WhitePoint::D75 => "D75",
            WhitePoint::E => "E",
            WhitePoint::F2 => "F2",
            WhitePoint::F7 => "F7",
            WhitePoint::F11 => "F11",
        }
    }
}

impl fmt::Display for WhitePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WhitePoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        WhitePoint::ALL
            .into_iter()
            .find(|w| w.name() == upper)
            .ok_or_else(|| format!("unknown white point {s:?}"))
    }
}

/// The Munsell renotation illuminant. Lab coordinates are relative to it.
pub const REFERENCE_WHITE: WhitePoint = WhitePoint::C;

/// Display transfer function (encoded channel to linear light)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Transfer {
    /// IEC 61966-2-1 piecewise curve
    Srgb,
    Linear,
    /// Pure power law with the given exponent
    Gamma(f64),
}

impl Transfer {
    /// Encoded [0, 1] channel to linear light
    #[inline]
    pub fn decode(self, c: f64) -> f64 {
        let c = clamp_unit(c);
        match self {
            Transfer::Srgb => {
                if c <= 0.04045 {
                    c / 12.92
                } else {
                    ((c + 0.055) / 1.055).powf(2.4)
                }
            }
            Transfer::Linear => c,
            Transfer::Gamma(g) => c.powf(g),
        }
    }

    /// Linear light to encoded [0, 1] channel
    #[inline]
    pub fn encode(self, c: f64) -> f64 {
        let c = clamp_unit(c);
        match self {
            Transfer::Srgb => {
                if c <= 0.0031308 {
                    c * 12.92
                } else {
                    1.055 * c.powf(1.0 / 2.4) - 0.055
                }
            }
            Transfer::Linear => c,
            Transfer::Gamma(g) => c.powf(1.0 / g),
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Srgb => write!(f, "srgb"),
            Transfer::Linear => write!(f, "linear"),
            Transfer::Gamma(g) => write!(f, "{}", g),
        }
    }
}

impl FromStr for Transfer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "srgb" => Ok(Transfer::Srgb),
            "linear" => Ok(Transfer::Linear),
            other => match other.parse::<f64>() {
                Ok(g) if g.is_finite() && g > 0.0 => Ok(Transfer::Gamma(g)),
                _ => Err(format!("expected srgb, linear or a positive gamma, got {s:?}")),
            },
        }
    }
}

/// Converter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConverterConfig {
    /// White point the display is assumed to be calibrated to
    pub white_point: WhitePoint,
    pub transfer: Transfer,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            white_point: WhitePoint::D65,
            transfer: Transfer::Srgb,
        }
    }
}

/// sRGB (ITU-R BT.709) primaries chromaticities
const SRGB_PRIMARIES: [(f64, f64); 3] = [(0.64, 0.33), (0.30, 0.60), (0.15, 0.06)];

/// Bradford cone response matrix (Lam 1985)
const BRADFORD: Matrix3 = [
    [0.8951, 0.2664, -0.1614],
    [-0.7502, 1.7135, 0.0367],
    [0.0389, -0.0685, 1.0296],
];

/// Pixel to CIELAB converter with its matrices precomputed
#[derive(Debug, Clone)]
pub struct Converter {
    config: ConverterConfig,
    /// Linear RGB to XYZ under the reference illuminant
    to_reference: Matrix3,
    /// XYZ under the reference illuminant back to linear RGB
    from_reference: Matrix3,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        let white = config.white_point.xyz();
        let rgb_to_xyz = primaries_matrix(SRGB_PRIMARIES, white);
        let adapt = bradford_adaptation(white, REFERENCE_WHITE.xyz());
        let to_reference = mat_mul(&adapt, &rgb_to_xyz);
        // Built from well-conditioned primaries and strictly positive whites
        let from_reference = invert(&to_reference).unwrap_or(IDENTITY);

        Self {
            config,
            to_reference,
            from_reference,
        }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert a pixel into the matching space
    pub fn to_perceptual(&self, pixel: Rgb) -> Lab {
        self.to_perceptual_unit(
            pixel.r as f64 / 255.0,
            pixel.g as f64 / 255.0,
            pixel.b as f64 / 255.0,
        )
    }

    /// Convert normalized channels, clamping each into [0, 1] first
    pub fn to_perceptual_unit(&self, r: f64, g: f64, b: f64) -> Lab {
        let t = self.config.transfer;
        let linear = [t.decode(r), t.decode(g), t.decode(b)];
        let xyz = Xyz::from_array(mat_vec(&self.to_reference, linear));
        Lab::from_xyz(xyz, REFERENCE_WHITE.xyz())
    }

    /// Approximate display color for a coordinate, clipped to the gamut
    pub fn to_rgb(&self, lab: &Lab) -> Rgb {
        let xyz = lab.to_xyz(REFERENCE_WHITE.xyz());
        let [r, g, b] = mat_vec(&self.from_reference, xyz.to_array());
        let t = self.config.transfer;
        Rgb::from_unit(t.encode(r), t.encode(g), t.encode(b))
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConverterConfig::default())
    }
}

/// One-shot conversion; prefer a reused [`Converter`] on hot paths
pub fn to_perceptual(pixel: Rgb, config: &ConverterConfig) -> Lab {
    Converter::new(*config).to_perceptual(pixel)
}

const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Normalized primary matrix: linear RGB to XYZ for the given white
fn primaries_matrix(primaries: [(f64, f64); 3], white: Xyz) -> Matrix3 {
    let mut p = [[0.0; 3]; 3];
    for (col, (x, y)) in primaries.iter().enumerate() {
        p[0][col] = x / y;
        p[1][col] = 1.0;
        p[2][col] = (1.0 - x - y) / y;
    }
    let s = mat_vec(&invert(&p).unwrap_or(IDENTITY), white.to_array());

    let mut m = p;
    for row in m.iter_mut() {
        for (col, v) in row.iter_mut().enumerate() {
            *v *= s[col];
        }
    }
    m
}

/// von Kries adaptation in Bradford cone space from `src` to `dst` white
fn bradford_adaptation(src: Xyz, dst: Xyz) -> Matrix3 {
    let s = mat_vec(&BRADFORD, src.to_array());
    let d = mat_vec(&BRADFORD, dst.to_array());
    let scale = [
        [d[0] / s[0], 0.0, 0.0],
        [0.0, d[1] / s[1], 0.0],
        [0.0, 0.0, d[2] / s[2]],
    ];
    let inv = invert(&BRADFORD).unwrap_or(IDENTITY);
    mat_mul(&inv, &mat_mul(&scale, &BRADFORD))
}

fn mat_vec(m: &Matrix3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn mat_mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn invert(m: &Matrix3) -> Option<Matrix3> {
    let [[a, b, c], [d, e, f], [g, h, i]] = *m;
    let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv = 1.0 / det;
    Some([
        [(e * i - f * h) * inv, (c * h - b * i) * inv, (b * f - c * e) * inv],
        [(f * g - d * i) * inv, (a * i - c * g) * inv, (c * d - a * f) * inv],
        [(d * h - e * g) * inv, (b * g - a * h) * inv, (a * e - b * d) * inv],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let converter = Converter::default();
        for pixel in [Rgb::new(0, 0, 0), Rgb::new(128, 64, 200), Rgb::new(255, 255, 255)] {
            let first = converter.to_perceptual(pixel);
            let second = converter.to_perceptual(pixel);
            assert_eq!(first.l.to_bits(), second.l.to_bits());
            assert_eq!(first.a.to_bits(), second.a.to_bits());
            assert_eq!(first.b.to_bits(), second.b.to_bits());
            assert_eq!(first, to_perceptual(pixel, &ConverterConfig::default()));
        }
    }

    #[test]
    fn test_white_maps_to_reference_white() {
        let lab = Converter::default().to_perceptual(Rgb::new(255, 255, 255));
        assert!(close(lab.l, 100.0, 1e-6), "L = {}", lab.l);
        assert!(lab.chroma() < 1e-6, "C = {}", lab.chroma());
    }

    #[test]
    fn test_grays_stay_achromatic() {
        let converter = Converter::default();
        for v in [1u8, 32, 128, 200, 254] {
            let lab = converter.to_perceptual(Rgb::new(v, v, v));
            assert!(lab.chroma() < 1e-6, "gray {} has chroma {}", v, lab.chroma());
        }
        let mid = converter.to_perceptual(Rgb::new(128, 128, 128));
        assert!(close(mid.l, 53.585, 0.01), "L = {}", mid.l);
    }

    #[test]
    fn test_grays_stay_achromatic_under_other_white_points() {
        for white_point in WhitePoint::ALL {
            let converter = Converter::new(ConverterConfig {
                white_point,
                transfer: Transfer::Srgb,
            });
            let lab = converter.to_perceptual(Rgb::new(90, 90, 90));
            assert!(lab.chroma() < 1e-6, "{} gray chroma {}", white_point, lab.chroma());
        }
    }

    #[test]
    fn test_red_is_warm_and_saturated() {
        let lab = Converter::default().to_perceptual(Rgb::new(255, 0, 0));
        assert!(lab.a > 60.0 && lab.b > 40.0, "{:?}", lab);
        assert!(lab.chroma() > 90.0);
    }

    #[test]
    fn test_unit_channels_are_clamped() {
        let converter = Converter::default();
        let clamped = converter.to_perceptual_unit(1.7, -0.3, f64::NAN);
        let expected = converter.to_perceptual(Rgb::new(255, 0, 0));
        assert_eq!(clamped, expected);
        assert_eq!(Rgb::from_clamped(300, -5, 128), Rgb::new(255, 0, 128));
        assert_eq!(Rgb::from_unit(2.0, -1.0, 0.5), Rgb::new(255, 0, 128));
    }

    #[test]
    fn test_round_trip_back_to_rgb() {
        let converter = Converter::default();
        for pixel in [Rgb::new(139, 90, 43), Rgb::new(10, 200, 90), Rgb::new(128, 128, 128)] {
            let back = converter.to_rgb(&converter.to_perceptual(pixel));
            let diff = |a: u8, b: u8| (a as i16 - b as i16).abs();
            assert!(diff(back.r, pixel.r) <= 1 && diff(back.g, pixel.g) <= 1 && diff(back.b, pixel.b) <= 1,
                "{:?} -> {:?}", pixel, back);
        }
    }

    #[test]
    fn test_hex() {
        assert_eq!(Rgb::from_hex("#8b5a2b"), Some(Rgb::new(139, 90, 43)));
        assert_eq!(Rgb::from_hex("FF0000"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(Rgb::from_hex("#12345"), None);
        assert_eq!(Rgb::from_hex("#gg0000"), None);
        assert_eq!(Rgb::new(139, 90, 43).to_hex(), "#8b5a2b");
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!("d65".parse::<WhitePoint>(), Ok(WhitePoint::D65));
        assert_eq!("C".parse::<WhitePoint>(), Ok(WhitePoint::C));
        assert!("D93".parse::<WhitePoint>().is_err());
        assert_eq!("sRGB".parse::<Transfer>(), Ok(Transfer::Srgb));
        assert_eq!("2.2".parse::<Transfer>(), Ok(Transfer::Gamma(2.2)));
        assert!("-1".parse::<Transfer>().is_err());
    }

    #[test]
    fn test_xyy() {
        let xyz = Xyz::from_xyy(0.3101, 0.3161, 1.0);
        assert!(close(xyz.y, 1.0, 1e-12));
        assert!(close(xyz.x, 0.98102, 1e-4));
        assert_eq!(Xyz::from_xyy(0.3, 0.0, 0.5), Xyz::new(0.0, 0.0, 0.0));
    }
}
