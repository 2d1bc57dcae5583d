use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lo: f64,
    pub hi: f64,
}

impl Bracket {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn width(self) -> f64 {
        (self.hi - self.lo).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RootError {
    #[error("no sign change in [{lo}, {hi}]")]
    NoSignChange { lo: f64, hi: f64 },
    #[error("function is not finite at {at}")]
    NonFinite { at: f64 },
}

pub trait RootFinder {
    fn find_root<F>(&self, f: F, bracket: Bracket) -> Result<f64, RootError>
    where
        F: Fn(f64) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct Bisection {
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for Bisection {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 200,
        }
    }
}

impl RootFinder for Bisection {
    fn find_root<F>(&self, f: F, bracket: Bracket) -> Result<f64, RootError>
    where
        F: Fn(f64) -> f64,
    {
        let mut lo = bracket.lo.min(bracket.hi);
        let mut hi = bracket.lo.max(bracket.hi);
        let mut f_lo = finite_at(&f, lo)?;
        let f_hi = finite_at(&f, hi)?;

        if f_lo == 0.0 {
            return Ok(lo);
        }
        if f_hi == 0.0 {
            return Ok(hi);
        }
        if f_lo.signum() == f_hi.signum() {
            return Err(RootError::NoSignChange { lo, hi });
        }

        let mut it = 0;
        while it < self.max_iterations && (hi - lo) > self.tolerance {
            it += 1;
            let mid = f64::midpoint(lo, hi);
            let f_mid = finite_at(&f, mid)?;
            trace!(iteration = it, lo, hi, mid, f_mid, "bisection step");

            if f_mid == 0.0 {
                return Ok(mid);
            }
            if f_mid.signum() == f_lo.signum() {
                lo = mid;
                f_lo = f_mid;
            } else {
                hi = mid;
            }
        }

        Ok(f64::midpoint(lo, hi))
    }
}

fn finite_at<F: Fn(f64) -> f64>(f: &F, x: f64) -> Result<f64, RootError> {
    let value = f(x);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RootError::NonFinite { at: x })
    }
}

/// Walks `[lo, hi]` in steps of `step` and returns the first sub-interval whose
/// endpoints straddle zero. A zero exactly at `lo` yields a degenerate bracket.
pub fn scan_for_sign_change<F>(f: F, lo: f64, hi: f64, step: f64) -> Option<Bracket>
where
    F: Fn(f64) -> f64,
{
    if !(step.is_finite() && step > 0.0 && lo <= hi) {
        return None;
    }

    let mut prev_x = lo;
    let mut prev = f(lo);
    if !prev.is_finite() {
        return None;
    }
    if prev == 0.0 {
        return Some(Bracket::new(lo, lo));
    }

    let steps = ((hi - lo) / step).ceil() as u64;
    for i in 1..=steps {
        let x = (lo + step * i as f64).min(hi);
        let value = f(x);
        if !value.is_finite() {
            return None;
        }
        if value == 0.0 || value.signum() != prev.signum() {
            return Some(Bracket::new(prev_x, x));
        }
        prev_x = x;
        prev = value;
    }
    None
}
