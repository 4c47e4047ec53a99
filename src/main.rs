use std::cell::RefCell;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use ntsc_crt::constants::{HRES, INPUT_SIZE, VRES};
use ntsc_crt::{Crt, NtscSettings, PixelFormat};

#[derive(Parser)]
#[command(name = "ntsc-crt")]
#[command(about = "Integer-only NTSC composite video signal emulation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pass a single image through the modulate/demodulate pipeline
    Image {
        /// Input image file (PNG, JPG, PPM, BMP, ...)
        input: String,
        /// Output image file
        #[arg(short, long, default_value = "output.png")]
        output: String,
        /// Output width
        #[arg(long, default_value = "832")]
        width: usize,
        /// Output height
        #[arg(long, default_value = "624")]
        height: usize,
        /// Amount of noise added to the signal (0 and up)
        #[arg(short, long, default_value = "24")]
        noise: i32,
        /// Artifact hue offset in degrees, 0-359
        #[arg(long, default_value = "0")]
        hue: i32,
        /// Render in monochrome instead of full color
        #[arg(short, long)]
        monochrome: bool,
        /// Start on the odd field (only meaningful with --progressive)
        #[arg(short, long)]
        field: bool,
        /// Progressive scan rather than interlaced
        #[arg(short, long)]
        progressive: bool,
        /// Don't scale the image to the monitor (needed for images that use
        /// artifact colors)
        #[arg(short, long)]
        raw: bool,
        /// Save the analog signal as a grayscale image instead of decoding
        #[arg(short = 'a', long)]
        save_analog: bool,
    },
    /// Encode video to composite and decode back (roundtrip)
    Roundtrip {
        /// Input video file
        input: String,
        /// Output video file
        #[arg(short, long, default_value = "output.mp4")]
        output: String,
        /// Output width
        #[arg(long, default_value = "640")]
        width: u32,
        /// Output height
        #[arg(long, default_value = "480")]
        height: u32,
        /// Amount of noise added to the signal (0 and up)
        #[arg(short, long, default_value = "24")]
        noise: i32,
        /// Artifact hue offset in degrees, 0-359
        #[arg(long, default_value = "0")]
        hue: i32,
        /// Render in monochrome instead of full color
        #[arg(short, long)]
        monochrome: bool,
        /// x264 CRF quality (0=lossless, 51=worst)
        #[arg(long, default_value = "17")]
        crf: u32,
        /// x264 preset
        #[arg(long, default_value = "fast")]
        preset: String,
        /// Number of parallel worker threads (default: all logical cores)
        #[arg(long)]
        threads: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Image {
            input,
            output,
            width,
            height,
            noise,
            hue,
            monochrome,
            field,
            progressive,
            raw,
            save_analog,
        } => cmd_image(
            &input, &output, width, height, noise, hue, monochrome, field, progressive, raw,
            save_analog,
        ),
        Commands::Roundtrip {
            input,
            output,
            width,
            height,
            noise,
            hue,
            monochrome,
            crf,
            preset,
            threads,
        } => cmd_roundtrip(
            &input, &output, width, height, noise, hue, monochrome, crf, &preset, threads,
        ),
    }
}

/// Run the accumulation loop the way a receiver settles on a still frame:
/// four frames, interlaced mode alternating fields and frame parity.
fn accumulate(crt: &mut Crt, settings: &mut NtscSettings<'_>, noise: i32, out: &mut [u8], progressive: bool) {
    for pass in 0..4 {
        crt.modulate(settings);
        crt.demodulate(noise, out);
        if !progressive {
            settings.field ^= 1;
            crt.modulate(settings);
            crt.demodulate(noise, out);
            if pass & 1 == 0 {
                // A frame is two fields.
                settings.frame ^= 1;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_image(
    input: &str,
    output: &str,
    width: usize,
    height: usize,
    noise: i32,
    hue: i32,
    monochrome: bool,
    field: bool,
    progressive: bool,
    raw: bool,
    save_analog: bool,
) -> Result<()> {
    let img = image::open(input).with_context(|| format!("Cannot open image '{}'", input))?;
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let data = rgb.as_raw();

    let noise = noise.max(0);
    let hue = hue.rem_euclid(360);

    eprintln!("Input: {} ({}x{})", input, w, h);
    eprintln!("Converting to {}x{}...", width, height);

    let mut out = vec![0u8; width * height * 3];
    let mut crt = Crt::new(width, height, PixelFormat::Rgb);
    crt.blend = true;
    crt.scanlines = true;

    let mut settings = NtscSettings::new(data, PixelFormat::Rgb, w, h);
    settings.as_color = !monochrome;
    settings.field = field as i32;
    settings.raw = raw;
    settings.hue = hue;

    let t0 = Instant::now();
    accumulate(&mut crt, &mut settings, noise, &mut out, progressive);
    eprintln!("  Pipeline: {:.1} ms", t0.elapsed().as_secs_f64() * 1000.0);

    if save_analog {
        let mut gray = vec![0u8; INPUT_SIZE * 3];
        for (px, &v) in gray.chunks_exact_mut(3).zip(crt.analog()) {
            px.fill((v as i32 + 128) as u8);
        }
        let analog_img = image::RgbImage::from_raw(HRES as u32, VRES as u32, gray)
            .context("Failed to create analog image")?;
        analog_img
            .save(output)
            .with_context(|| format!("Cannot save image '{}'", output))?;
        eprintln!("Output: {} ({}x{}, analog signal)", output, HRES, VRES);
    } else {
        let out_img = image::RgbImage::from_raw(width as u32, height as u32, out)
            .context("Failed to create output image")?;
        out_img
            .save(output)
            .with_context(|| format!("Cannot save image '{}'", output))?;
        eprintln!("Output: {} ({}x{})", output, width, height);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_roundtrip(
    input: &str,
    output: &str,
    width: u32,
    height: u32,
    noise: i32,
    hue: i32,
    monochrome: bool,
    crf: u32,
    preset: &str,
    threads: Option<usize>,
) -> Result<()> {
    let out_w = width as usize;
    let out_h = height as usize;
    let noise = noise.max(0);
    let hue = hue.rem_euclid(360);

    let (in_w, in_h, fps, total_frames) = ffprobe_video(input)?;
    eprintln!(
        "Input: {} ({}x{} @ {:.3} fps, {} frames)",
        input, in_w, in_h, fps, total_frames
    );
    eprintln!("Output: {} ({}x{} @ {:.3} fps)", output, out_w, out_h, fps);

    let frame_bytes = in_w * in_h * 3;

    let mut reader = Command::new("ffmpeg")
        .args([
            "-i",
            input,
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-v",
            "error",
            "pipe:1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn ffmpeg reader. Is ffmpeg installed?")?;

    let mut writer = Command::new("ffmpeg")
        .args([
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", out_w, out_h),
            "-r",
            &format!("{}", fps),
            "-i",
            "pipe:0",
            "-c:v",
            "libx264",
            "-preset",
            preset,
            "-crf",
            &format!("{}", crf),
            "-pix_fmt",
            "yuv420p",
            "-v",
            "error",
            output,
        ])
        .stdin(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn ffmpeg writer. Is ffmpeg installed?")?;

    let reader_stdout = reader.stdout.take().unwrap();
    let mut reader_buf = std::io::BufReader::new(reader_stdout);
    let writer_stdin = writer.stdin.take().unwrap();
    let mut writer_buf = std::io::BufWriter::new(writer_stdin);

    let num_cpus = threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    let batch_size = num_cpus;
    eprintln!("  Batch size: {} (parallel frames)", batch_size);

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus)
        .build_global()
        .ok();

    let mut frame_num = 0u32;
    let total_start = Instant::now();

    let pb = if total_frames > 0 {
        let pb = ProgressBar::new(total_frames as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "Processing {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}<{eta_precise}, {msg}]",
            )
            .unwrap()
            .progress_chars("##-"),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template(
                "Processing {spinner} {pos} frames [{elapsed_precise}, {msg}]",
            )
            .unwrap(),
        );
        pb
    };

    // Each rayon thread keeps its own CRT so sync and burst convergence
    // carry across the frames that thread processes.
    thread_local! {
        static TL_CRT: RefCell<Option<(Crt, Vec<u8>)>> = RefCell::new(None);
    }

    let mut frame_pool: Vec<Vec<u8>> = (0..batch_size).map(|_| vec![0u8; frame_bytes]).collect();

    loop {
        let mut batch_count = 0usize;
        for buf in frame_pool.iter_mut() {
            match reader_buf.read_exact(buf) {
                Ok(()) => {
                    batch_count += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    eprintln!("Read error: {}", e);
                    break;
                }
            }
        }

        if batch_count == 0 {
            break;
        }

        let batch_items: Vec<(&[u8], u32)> = (0..batch_count)
            .map(|i| (frame_pool[i].as_slice(), frame_num + i as u32))
            .collect();

        let results: Vec<Vec<u8>> = batch_items
            .par_iter()
            .map(|(frame_buf, fnum)| {
                TL_CRT.with(|cell| {
                    let mut slot = cell.borrow_mut();
                    let (crt, buf) = slot.get_or_insert_with(|| {
                        let mut crt = Crt::new(out_w, out_h, PixelFormat::Rgb);
                        crt.blend = true;
                        crt.scanlines = true;
                        (crt, vec![0u8; out_w * out_h * 3])
                    });

                    let mut settings = NtscSettings::new(frame_buf, PixelFormat::Rgb, in_w, in_h);
                    settings.as_color = !monochrome;
                    settings.hue = hue;
                    settings.frame = (fnum & 1) as i32;

                    // Both fields of the frame land on the output image.
                    crt.modulate(&mut settings);
                    crt.demodulate(noise, buf);
                    settings.field = 1;
                    crt.modulate(&mut settings);
                    crt.demodulate(noise, buf);

                    buf.clone()
                })
            })
            .collect();

        for result in &results {
            writer_buf.write_all(result).context("write failed")?;
        }

        frame_num += batch_count as u32;
        pb.inc(batch_count as u64);

        let elapsed = total_start.elapsed().as_secs_f64();
        pb.set_message(format!("{:.1} fps", frame_num as f64 / elapsed));
    }

    pb.finish_and_clear();

    drop(writer_buf);
    let _ = reader.wait();
    let _ = writer.wait();

    let total_elapsed = total_start.elapsed().as_secs_f64();
    eprintln!(
        "Done: {} frames in {:.1}s ({:.1} fps)",
        frame_num,
        total_elapsed,
        frame_num as f64 / total_elapsed,
    );

    mux_audio(input, output);
    Ok(())
}

fn ffprobe_video(path: &str) -> Result<(usize, usize, f64, usize)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames",
            "-of",
            "csv=p=0",
            path,
        ])
        .output()
        .context("Failed to run ffprobe. Is ffmpeg installed?")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parts: Vec<&str> = stdout.trim().split(',').collect();

    if parts.len() < 3 {
        bail!("Cannot probe video '{}'. ffprobe output: {}", path, stdout);
    }

    let w: usize = parts[0].parse().unwrap_or(640);
    let h: usize = parts[1].parse().unwrap_or(480);

    let fps = if let Some((num, den)) = parts[2].split_once('/') {
        let n: f64 = num.parse().unwrap_or(30000.0);
        let d: f64 = den.parse().unwrap_or(1001.0);
        n / d
    } else {
        parts[2].parse().unwrap_or(29.97)
    };

    let total_frames: usize = parts.get(3).and_then(|s| s.parse().ok()).unwrap_or(0);

    Ok((w, h, fps, total_frames))
}

fn mux_audio(source: &str, video_path: &str) {
    let probe = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "a",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "csv=p=0",
            source,
        ])
        .output();

    let has_audio = match probe {
        Ok(out) => String::from_utf8_lossy(&out.stdout).contains("audio"),
        Err(_) => false,
    };

    if !has_audio {
        return;
    }

    let tmp = format!("{}.mux.mp4", video_path);
    let result = Command::new("ffmpeg")
        .args([
            "-y",
            "-i",
            video_path,
            "-i",
            source,
            "-map",
            "0:v",
            "-map",
            "1:a",
            "-c:v",
            "copy",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-shortest",
            &tmp,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(status) if status.success() => {
            let _ = std::fs::rename(&tmp, video_path);
        }
        _ => {
            let _ = std::fs::remove_file(&tmp);
        }
    }
}
