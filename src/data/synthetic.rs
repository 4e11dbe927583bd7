//! Deterministic MNIST-shaped data: seven-segment digits drawn on a 28×28
//! canvas with jitter and Gaussian noise.

use anyhow::Result;

use crate::pickle::{NdArray, Value};

pub const SIDE: usize = 28;
pub const PIXELS: usize = SIDE * SIDE;

/// Segments a..g lit for each digit, clockwise from the top, `g` in the middle.
const SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

/// Segment end points (x0, y0, x1, y1) on the canvas before jitter.
const SEGMENT_LINES: [(usize, usize, usize, usize); 7] = [
    (9, 5, 18, 5),
    (18, 5, 18, 14),
    (18, 14, 18, 23),
    (9, 23, 18, 23),
    (9, 14, 9, 23),
    (9, 5, 9, 14),
    (9, 14, 18, 14),
];

/// Minimal deterministic PRNG (xoshiro256**)
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

/// Draw one digit. Intensities are in `[0, 1]` like the published pickled MNIST.
pub fn draw_digit(digit: usize, rng: &mut SimpleRng) -> [f32; PIXELS] {
    let mut canvas = [0f32; PIXELS];
    let dx = rng.below(5) as isize - 2;
    let dy = rng.below(5) as isize - 2;

    for (lit, &(x0, y0, x1, y1)) in SEGMENTS[digit % 10].iter().zip(SEGMENT_LINES.iter()) {
        if !*lit {
            continue;
        }
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                // Strokes are two pixels wide.
                for (ox, oy) in [(0isize, 0isize), (1, 0), (0, 1), (1, 1)] {
                    let px = x as isize + dx + ox;
                    let py = y as isize + dy + oy;
                    if (0..SIDE as isize).contains(&px) && (0..SIDE as isize).contains(&py) {
                        let value = 0.85 + rng.gauss(0.0, 0.08);
                        let slot = &mut canvas[py as usize * SIDE + px as usize];
                        *slot = slot.max(value.clamp(0.0, 1.0) as f32);
                    }
                }
            }
        }
    }
    canvas
}

/// `(images, labels)` for `n` samples with labels cycling through 0..=9.
pub fn synthetic_split(n: usize, rng: &mut SimpleRng) -> Result<Value> {
    let mut pixels = Vec::with_capacity(n * PIXELS);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let digit = (i + rng.below(10) as usize) % 10;
        pixels.extend_from_slice(&draw_digit(digit, rng));
        labels.push(digit as i64);
    }
    let images = NdArray::from_f32(vec![n, PIXELS], &pixels)?;
    let labels = NdArray::from_i64(vec![n], &labels)?;
    Ok(Value::Tuple(vec![Value::NdArray(images), Value::NdArray(labels)]))
}

/// The pickled layout of `mnist.pkl`: `(training, validation, test)`.
pub fn synthetic_dataset(sizes: [usize; 3], seed: u64) -> Result<Value> {
    let mut rng = SimpleRng::new(seed);
    let splits = sizes
        .iter()
        .map(|&n| synthetic_split(n, &mut rng))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Tuple(splits))
}
