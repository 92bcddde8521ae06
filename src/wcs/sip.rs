//! SIP (Simple Imaging Polynomial) distortion coefficients.
//!
//! A SIP-distorted TAN WCS applies polynomial corrections to pixel offsets
//! from CRPIX before the linear CD transform:
//!
//! ```text
//! U = u + Σ A_pq · u^p · v^q        V = v + Σ B_pq · u^p · v^q
//! ```
//!
//! and uses a separately fitted polynomial for the reverse direction:
//!
//! ```text
//! u = U + Σ AP_pq · U^p · V^q       v = V + Σ BP_pq · U^p · V^q
//! ```
//!
//! Coefficients are stored flat, for every term with `p + q ≤ order`. The
//! forward polynomials only populate `p + q ≥ 2`; the reverse polynomials may
//! carry constant and linear terms as well.

/// One polynomial `Σ c_pq · x^p · y^q` over all terms with `p + q ≤ order`.
#[derive(Debug, Clone, PartialEq)]
pub struct SipPolynomial {
    /// Maximum total degree `p + q`.
    pub order: u32,
    /// Flat coefficients, indexed by [`coeff_index`].
    pub coeffs: Vec<f64>,
}

impl SipPolynomial {
    /// Create a zero polynomial of the given order.
    pub fn zero(order: u32) -> Self {
        Self {
            order,
            coeffs: vec![0.0; num_coeffs(order)],
        }
    }

    /// Coefficient of `x^p · y^q`; zero for terms beyond the order.
    pub fn get(&self, p: u32, q: u32) -> f64 {
        if p + q > self.order {
            return 0.0;
        }
        self.coeffs[coeff_index(p, q)]
    }

    /// Set the coefficient of `x^p · y^q`.
    ///
    /// # Panics
    /// If `p + q` exceeds the polynomial order.
    pub fn set(&mut self, p: u32, q: u32, value: f64) {
        assert!(p + q <= self.order, "term ({p}, {q}) exceeds order {}", self.order);
        self.coeffs[coeff_index(p, q)] = value;
    }

    /// Evaluate the polynomial at `(x, y)`.
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let mut result = 0.0;
        let mut idx = 0;
        for s in 0..=self.order {
            for p in (0..=s).rev() {
                let q = s - p;
                result += self.coeffs[idx] * x.powi(p as i32) * y.powi(q as i32);
                idx += 1;
            }
        }
        result
    }
}

/// Forward and reverse SIP polynomials.
#[derive(Debug, Clone, PartialEq)]
pub struct SipDistortion {
    pub a: SipPolynomial,
    pub b: SipPolynomial,
    pub ap: SipPolynomial,
    pub bp: SipPolynomial,
}

impl SipDistortion {
    /// Pixel offset from CRPIX → undistorted offset (forward, A/B).
    pub fn undistort(&self, u: f64, v: f64) -> (f64, f64) {
        (u + self.a.eval(u, v), v + self.b.eval(u, v))
    }

    /// Undistorted offset → pixel offset from CRPIX (reverse, AP/BP).
    pub fn distort(&self, uu: f64, vv: f64) -> (f64, f64) {
        (uu + self.ap.eval(uu, vv), vv + self.bp.eval(uu, vv))
    }
}

// ── Polynomial term helpers ─────────────────────────────────────────────────

/// Number of coefficients for terms with `p + q ≤ order`.
///
///   order 0: 1, order 1: 3, order 2: 6, order 3: 10, order 4: 15
pub fn num_coeffs(order: u32) -> usize {
    let n = order as usize + 1;
    n * (n + 1) / 2
}

/// Map `(p, q)` to a flat index.
///
/// Terms are enumerated in order of increasing sum, then decreasing p:
///   sum=0: (0,0)=0
///   sum=1: (1,0)=1, (0,1)=2
///   sum=2: (2,0)=3, (1,1)=4, (0,2)=5
pub fn coeff_index(p: u32, q: u32) -> usize {
    let s = p + q;
    num_coeffs(s) - (s as usize + 1) + (s - p) as usize
}

/// Enumerate all `(p, q)` pairs with `p + q ≤ order`, in [`coeff_index`] order.
pub fn term_pairs(order: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::with_capacity(num_coeffs(order));
    for s in 0..=order {
        for p in (0..=s).rev() {
            pairs.push((p, s - p));
        }
    }
    pairs
}
