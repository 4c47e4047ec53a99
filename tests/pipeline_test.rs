//! Full modulate/demodulate roundtrip scenarios.

use ntsc_crt::constants::SYNC_LEVEL;
use ntsc_crt::{Crt, NtscSettings, PixelFormat};

fn solid(w: usize, h: usize, rgb: [u8; 3]) -> Vec<u8> {
    let mut data = vec![0u8; w * h * 3];
    for px in data.chunks_exact_mut(3) {
        px.copy_from_slice(&rgb);
    }
    data
}

/// Vertical black/white bars with a two-pixel period.
fn bars(w: usize, h: usize) -> Vec<u8> {
    let mut data = vec![0u8; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let v = if (x / 2) % 2 == 0 { 255 } else { 0 };
            let o = (y * w + x) * 3;
            data[o] = v;
            data[o + 1] = v;
            data[o + 2] = v;
        }
    }
    data
}

/// The accumulation loop a still image settles with: four frames, two
/// interlaced fields each, frame parity flipping every other pass.
fn accumulate(crt: &mut Crt, s: &mut NtscSettings<'_>, noise: i32, out: &mut [u8]) {
    for pass in 0..4 {
        crt.modulate(s);
        crt.demodulate(noise, out);
        s.field ^= 1;
        crt.modulate(s);
        crt.demodulate(noise, out);
        if pass & 1 == 0 {
            s.frame ^= 1;
        }
    }
}

/// Mean R, G, B over the central region of an output raster.
fn central_means(out: &[u8], w: usize, h: usize, fmt: PixelFormat) -> (f64, f64, f64) {
    let bpp = fmt.bpp();
    let (ro, go, bo) = fmt.offsets();
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    let mut n = 0u64;
    for y in h / 4..3 * h / 4 {
        for x in w / 4..3 * w / 4 {
            let px = &out[(y * w + x) * bpp..(y * w + x) * bpp + bpp];
            r += px[ro] as u64;
            g += px[go] as u64;
            b += px[bo] as u64;
            n += 1;
        }
    }
    (r as f64 / n as f64, g as f64 / n as f64, b as f64 / n as f64)
}

#[test]
fn monochrome_white_decodes_bright_and_neutral() {
    let data = solid(64, 48, [255, 255, 255]);
    let (w, h) = (640usize, 480usize);
    let mut crt = Crt::new(w, h, PixelFormat::Bgra);
    let mut out = vec![0u8; w * h * 4];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);
    s.as_color = false;

    accumulate(&mut crt, &mut s, 0, &mut out);

    // Without a burst there is no carrier reference, so chroma stays zero
    // and the picture is exactly neutral.
    for y in h / 4..3 * h / 4 {
        for x in w / 4..3 * w / 4 {
            let px = &out[(y * w + x) * 4..(y * w + x) * 4 + 4];
            let (b, g, r) = (px[0], px[1], px[2]);
            assert_eq!(r, g, "at ({}, {})", x, y);
            assert_eq!(r, b, "at ({}, {})", x, y);
            assert!(r > 200, "dim white {} at ({}, {})", r, x, y);
        }
    }
}

#[test]
fn solid_red_stays_red_dominant() {
    let data = solid(64, 48, [255, 0, 0]);
    let (w, h) = (640usize, 480usize);
    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    let mut out = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);

    accumulate(&mut crt, &mut s, 0, &mut out);

    let (r, g, b) = central_means(&out, w, h, PixelFormat::Rgb);
    assert!(r > g + 20.0, "r {} vs g {}", r, g);
    assert!(r > b + 20.0, "r {} vs b {}", r, b);

    // The exact center pixel is red-dominant too, not just on average.
    let px = &out[((h / 2) * w + w / 2) * 3..((h / 2) * w + w / 2) * 3 + 3];
    assert!(px[0] > px[1] && px[0] > px[2], "center {:?}", px);
}

#[test]
fn raw_bars_produce_artifact_color() {
    let (w, h) = (640usize, 480usize);
    let data = bars(64, 48);

    // Color decode of a pure luma pattern at the subcarrier rate.
    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    let mut out = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);
    s.raw = true;
    accumulate(&mut crt, &mut s, 0, &mut out);

    // Column-averaged channel spread over the central rows; the source is
    // gray, so any spread is false color.
    let mut max_spread = 0i32;
    for x in 0..w {
        let (mut r, mut g, mut b) = (0i32, 0i32, 0i32);
        for y in h / 4..3 * h / 4 {
            let px = &out[(y * w + x) * 3..(y * w + x) * 3 + 3];
            r += px[0] as i32;
            g += px[1] as i32;
            b += px[2] as i32;
        }
        let n = (3 * h / 4 - h / 4) as i32;
        let (r, g, b) = (r / n, g / n, b / n);
        let spread = r.max(g).max(b) - r.min(g).min(b);
        max_spread = max_spread.max(spread);
    }
    assert!(max_spread > 20, "no artifact color, spread {}", max_spread);

    // The same pattern decoded without color stays neutral.
    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    let mut out = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);
    s.raw = true;
    s.as_color = false;
    accumulate(&mut crt, &mut s, 0, &mut out);
    for px in out.chunks_exact(3) {
        assert_eq!(px[0], px[1]);
        assert_eq!(px[0], px[2]);
    }
}

#[test]
fn analog_export_spans_sync_blank_and_video() {
    let data = solid(64, 48, [255, 255, 255]);
    let (w, h) = (640usize, 480usize);
    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    let mut out = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);

    accumulate(&mut crt, &mut s, 0, &mut out);

    let analog = crt.analog();
    assert!(analog.iter().any(|&v| v as i32 == SYNC_LEVEL), "no sync tip");
    assert!(analog.iter().any(|&v| v == 0), "no blanking level");
    assert!(analog.iter().any(|&v| v as i32 > 60), "no active video");
}

#[test]
fn hue_rotation_flips_channel_dominance() {
    let data = solid(64, 48, [255, 0, 0]);
    let (w, h) = (640usize, 480usize);

    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    let mut out0 = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);
    accumulate(&mut crt, &mut s, 0, &mut out0);
    let (r0, _, b0) = central_means(&out0, w, h, PixelFormat::Rgb);

    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    crt.hue = 180;
    let mut out1 = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);
    accumulate(&mut crt, &mut s, 0, &mut out1);
    let (r1, _, b1) = central_means(&out1, w, h, PixelFormat::Rgb);

    // Turning the tint control half a turn rotates the demodulation axes,
    // pushing red toward its complement.
    assert!(r0 > b0, "hue 0: r {} b {}", r0, b0);
    assert!(b1 > r1, "hue 180: r {} b {}", r1, b1);
    assert!(r0 > r1 + 20.0, "red did not fade: {} vs {}", r0, r1);
}

#[test]
fn blend_averages_with_previous_frame() {
    let data = solid(64, 48, [80, 160, 240]);
    let (w, h) = (320usize, 240usize);
    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    let mut out = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);

    accumulate(&mut crt, &mut s, 0, &mut out);

    // A twin CRT from identical state shows what the next frame looks like
    // without blending.
    let mut twin = crt.clone();
    let mut fresh = out.clone();
    twin.demodulate(0, &mut fresh);

    let previous = out.clone();
    crt.blend = true;
    crt.demodulate(0, &mut out);

    for ((&blended, &new), &old) in out.iter().zip(fresh.iter()).zip(previous.iter()) {
        let avg = (new as i32 + old as i32) / 2;
        assert!(
            (blended as i32 - avg).abs() <= 1,
            "blend {} vs avg of {} and {}",
            blended,
            new,
            old
        );
    }
}

#[test]
fn burst_reference_converges() {
    let data = solid(64, 48, [255, 0, 0]);
    let (w, h) = (640usize, 480usize);
    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    let mut out = vec![0u8; w * h * 3];
    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);

    // Progressive passes keep the burst phase constant between calls.
    for _ in 0..4 {
        crt.modulate(&mut s);
        crt.demodulate(0, &mut out);
    }
    let before = *crt.color_carrier_state();
    crt.modulate(&mut s);
    crt.demodulate(0, &mut out);
    let after = *crt.color_carrier_state();

    for (row_b, row_a) in before.iter().zip(after.iter()) {
        for (&b, &a) in row_b.iter().zip(row_a.iter()) {
            let tolerance = b.abs() / 128 + 1;
            assert!(
                (a - b).abs() <= tolerance,
                "carrier state moved from {} to {}",
                b,
                a
            );
        }
    }
}

#[test]
fn fields_land_on_disjoint_rows() {
    let data = solid(64, 48, [255, 255, 255]);
    let (w, h) = (640usize, 480usize);
    let mut crt = Crt::new(w, h, PixelFormat::Rgb);
    crt.scanlines = true;

    let written_rows = |out: &[u8]| -> Vec<usize> {
        (0..h)
            .filter(|y| out[y * w * 3..(y + 1) * w * 3].iter().any(|&v| v != 0xaa))
            .collect()
    };

    let mut s = NtscSettings::new(&data, PixelFormat::Rgb, 64, 48);
    let mut out = vec![0xaau8; w * h * 3];
    crt.modulate(&mut s);
    crt.demodulate(0, &mut out);
    let even_rows = written_rows(&out);

    s.field = 1;
    let mut out = vec![0xaau8; w * h * 3];
    crt.modulate(&mut s);
    crt.demodulate(0, &mut out);
    let odd_rows = written_rows(&out);

    assert!(!even_rows.is_empty());
    assert!(!odd_rows.is_empty());
    for row in &even_rows {
        assert!(!odd_rows.contains(row), "row {} written by both fields", row);
    }
}
