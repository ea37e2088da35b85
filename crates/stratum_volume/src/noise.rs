//! # Simplex Noise
//!
//! Deterministic 2D simplex noise for the default terrain generator.
//!
//! Given the same seed, samples are bit-identical on every platform.

/// Mixes a seed with a purpose tag into an independent sub-seed.
#[inline]
#[must_use]
pub const fn derive_seed(seed: u64, purpose: u64) -> u64 {
    let mut hash = seed ^ purpose.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
    hash ^ (hash >> 32)
}

/// 12 gradient directions, the edges of a 12-gon.
const GRADIENTS: [[f64; 2]; 12] = [
    [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [-1.0, 1.0],
    [-1.0, 0.0], [-1.0, -1.0], [0.0, -1.0], [1.0, -1.0],
    [1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0],
];

/// 2D simplex noise generator producing values in `[-1, 1]`.
#[derive(Clone)]
pub struct SimplexNoise {
    /// 256 shuffled entries, doubled so lookups never wrap.
    perm: [u8; 512],
}

impl SimplexNoise {
    /// (sqrt(3) - 1) / 2
    const F2: f64 = 0.366_025_403_784_438_6;
    /// (3 - sqrt(3)) / 6
    const G2: f64 = 0.211_324_865_405_187_1;

    /// Builds the permutation table from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut perm = [0u8; 512];
        for (i, p) in perm.iter_mut().take(256).enumerate() {
            *p = i as u8;
        }

        // Fisher-Yates with xorshift64; a zero state would stick at zero.
        let mut state = seed | 1;
        for i in (1..256usize).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state % (i as u64 + 1)) as usize;
            perm.swap(i, j);
        }
        for i in 0..256 {
            perm[256 + i] = perm[i];
        }

        Self { perm }
    }

    #[inline]
    fn hash(&self, index: usize) -> usize {
        usize::from(self.perm[index & 511])
    }

    #[inline]
    fn corner(&self, x: f64, y: f64, hash: usize) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t < 0.0 {
            return 0.0;
        }
        let g = GRADIENTS[hash % 12];
        let t2 = t * t;
        t2 * t2 * (x * g[0] + y * g[1])
    }

    /// Samples noise at a point.
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let skew = (x + y) * Self::F2;
        let i = (x + skew).floor();
        let j = (y + skew).floor();

        let unskew = (i + j) * Self::G2;
        let x0 = x - (i - unskew);
        let y0 = y - (j - unskew);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - f64::from(i1) + Self::G2;
        let y1 = y0 - f64::from(j1) + Self::G2;
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let y2 = y0 - 1.0 + 2.0 * Self::G2;

        let ii = (i as i64 & 255) as usize;
        let jj = (j as i64 & 255) as usize;

        let h0 = self.hash(ii + self.hash(jj));
        let h1 = self.hash(ii + i1 as usize + self.hash(jj + j1 as usize));
        let h2 = self.hash(ii + 1 + self.hash(jj + 1));

        let n = self.corner(x0, y0, h0) + self.corner(x1, y1, h1) + self.corner(x2, y2, h2);
        (70.0 * n).clamp(-1.0, 1.0)
    }

    /// Fractal sum of `octaves` layers, normalized back to `[-1, 1]`.
    #[must_use]
    pub fn fbm(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut norm = 0.0;

        for _ in 0..octaves.max(1) {
            total += self.sample(x * frequency, y * frequency) * amplitude;
            norm += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        total / norm
    }
}
