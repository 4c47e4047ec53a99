//! Integer band-limiting filters.
//!
//! Modulation uses a single-pole IIR low-pass per YIQ channel; demodulation
//! uses a three-band equalizer built from cascaded one-pole low/high splits.
//! Both derive their coefficients from the fixed-point routines in
//! [`crate::fixed`], so the whole signal path stays in integer arithmetic.

use crate::fixed::{expx, sincos14, EXP_ONE, EXP_P, EXP_PI, T14_PI};

/// Infinite impulse response low-pass for bandlimiting YIQ during modulation.
#[derive(Clone, Debug)]
pub struct IirLowpass {
    c: i32,
    h: i32, // history
}

impl IirLowpass {
    /// `freq` is the total bandwidth, `limit` the cutoff frequency.
    pub fn new(freq: i32, limit: i32) -> Self {
        let rate = (freq << 9) / limit; // cycles/pixel rate
        Self {
            c: EXP_ONE - expx(-((EXP_PI << 9) / rate)),
            h: 0,
        }
    }

    pub fn reset(&mut self) {
        self.h = 0;
    }

    #[inline]
    pub fn filter(&mut self, s: i32) -> i32 {
        self.h += (s - self.h) * self.c >> EXP_P;
        self.h
    }
}

const HISTLEN: usize = 3;
const HISTOLD: usize = HISTLEN - 1; // oldest entry
const HISTNEW: usize = 0; // newest entry

/// Coefficient precision. The gains are pre-scaled against this value.
const EQ_P: i32 = 16;
const EQ_R: i32 = 1 << (EQ_P - 1); // rounding

/// Three-band equalizer.
///
/// Four cascaded one-pole stages per low/high split; the low band is the
/// smoothed low cascade, the mid band the difference of the two cascades,
/// and the high band the three-sample-old raw input minus the high cascade.
#[derive(Clone, Debug)]
pub struct EqFilter {
    lf: i32, // low fraction
    hf: i32, // high fraction
    g: [i32; 3], // gains
    fl: [i32; 4],
    fh: [i32; 4],
    h: [i32; HISTLEN], // history
}

impl EqFilter {
    /// `f_lo` / `f_hi` are the split frequencies, `rate` the sampling rate,
    /// all in the same unit; the gains are 16-bit fixed point.
    pub fn new(f_lo: i32, f_hi: i32, rate: i32, g_lo: i32, g_mid: i32, g_hi: i32) -> Self {
        let (sn, _) = sincos14(T14_PI * f_lo / rate);
        let lf = 2 * (sn << (EQ_P - 15));
        let (sn, _) = sincos14(T14_PI * f_hi / rate);
        let hf = 2 * (sn << (EQ_P - 15));
        Self {
            lf,
            hf,
            g: [g_lo, g_mid, g_hi],
            fl: [0; 4],
            fh: [0; 4],
            h: [0; HISTLEN],
        }
    }

    pub fn reset(&mut self) {
        self.fl = [0; 4];
        self.fh = [0; 4];
        self.h = [0; HISTLEN];
    }

    pub fn filter(&mut self, s: i32) -> i32 {
        // The coefficient products are widened to 64 bits so a noisy chroma
        // excursion cannot wrap; in the normal signal range the result is
        // bit-identical to 32-bit arithmetic.
        let step = |f: i32, x: i32| ((f as i64 * x as i64 + EQ_R as i64) >> EQ_P) as i32;

        self.fl[0] += step(self.lf, s - self.fl[0]);
        self.fh[0] += step(self.hf, s - self.fh[0]);
        for i in 1..4 {
            self.fl[i] += step(self.lf, self.fl[i - 1] - self.fl[i]);
            self.fh[i] += step(self.hf, self.fh[i - 1] - self.fh[i]);
        }

        let mut r = [
            self.fl[3],
            self.fh[3] - self.fl[3],
            self.h[HISTOLD] - self.fh[3],
        ];
        for (band, gain) in r.iter_mut().zip(self.g) {
            *band = ((*band as i64 * gain as i64) >> EQ_P) as i32;
        }

        for i in (1..HISTLEN).rev() {
            self.h[i] = self.h[i - 1];
        }
        self.h[HISTNEW] = s;

        r[0] + r[1] + r[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{I_FREQ, L_FREQ, Q_FREQ, Y_FREQ};

    #[test]
    fn iir_converges_to_dc() {
        let mut f = IirLowpass::new(L_FREQ, Y_FREQ);
        let mut out = 0;
        for _ in 0..64 {
            out = f.filter(100);
        }
        // Truncation can hold the state one step below the input.
        assert!((out - 100).abs() <= 1, "DC response {}", out);
    }

    #[test]
    fn iir_narrower_band_converges_slower() {
        let mut y = IirLowpass::new(L_FREQ, Y_FREQ);
        let mut q = IirLowpass::new(L_FREQ, Q_FREQ);
        let (ya, qa) = (y.filter(1000), q.filter(1000));
        assert!(ya > qa, "Y step response {} vs Q {}", ya, qa);
    }

    #[test]
    fn iir_reset_clears_history_only() {
        let mut f = IirLowpass::new(L_FREQ, I_FREQ);
        let first = f.filter(80);
        f.filter(80);
        f.reset();
        assert_eq!(f.filter(80), first);
    }

    #[test]
    fn eq_unity_gains_pass_dc() {
        // With all gains at one the three bands telescope back to the
        // delayed input, so DC passes exactly.
        let mut eq = EqFilter::new(95, 190, 910, 65536, 65536, 65536);
        let mut out = 0;
        for _ in 0..256 {
            out = eq.filter(100);
        }
        assert_eq!(out, 100);
    }

    #[test]
    fn eq_low_gain_scales_dc() {
        // DC settles entirely in the low band, so halving the low gain
        // halves the response.
        let mut eq = EqFilter::new(95, 190, 910, 32768, 65536, 65536);
        let mut out = 0;
        for _ in 0..256 {
            out = eq.filter(100);
        }
        assert_eq!(out, 50);
    }

    #[test]
    fn eq_reset_restores_initial_response() {
        let mut eq = EqFilter::new(95, 190, 910, 65536, 8192, 9175);
        let first = eq.filter(100);
        for _ in 0..32 {
            eq.filter(-3);
        }
        eq.reset();
        assert_eq!(eq.filter(100), first);
    }
}
