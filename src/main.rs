//! MLX90393 magnetometer reader - continuous acquisition and display
//!
//! Configures the sensor behind an FT232H bridge and shows a live view of the
//! magnetic field and die temperature on the console until Ctrl+C.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, LevelFilter};

use ft232_mlx90393_interface::{
    format_reading, logging, parse_address, parse_duration, Axes, BusError, ConfigOptions,
    DigitalFilter, Ft232hTransport, Gain, MagneticReading, Mlx90393, Mlx90393Error, Oversampling,
    Resolution, StreamControl,
};

// Bar graph range in µT (the Earth's field is 25-65 µT)
const FIELD_FULL_SCALE: f32 = 100.0;
const BAR_WIDTH: usize = 40;

#[derive(Parser, Debug)]
#[command(name = "mlx90393-reader")]
#[command(about = "Live magnetic field readout from an MLX90393 via FT232H")]
struct Args {
    /// FT232H I2C channel index
    #[arg(short, long, default_value_t = 0)]
    channel: u32,

    /// 7-bit I2C address of the sensor (decimal or 0x-prefixed hex)
    #[arg(short, long, default_value = "0x0C", value_parser = parse_address)]
    address: u8,

    /// I2C clock rate in Hz
    #[arg(long, default_value_t = 400_000)]
    clock: u32,

    /// Analog gain code (0 = 5x ... 7 = 1x)
    #[arg(short, long, default_value_t = 7)]
    gain: u8,

    /// Resolution code for all axes (0-3)
    #[arg(short, long, default_value_t = 0)]
    resolution: u8,

    /// Oversampling code (0-3)
    #[arg(short, long, default_value_t = 0)]
    oversampling: u8,

    /// Digital filter code (0-7)
    #[arg(short, long, default_value_t = 0)]
    filter: u8,

    /// Display rate in Hz (1-100)
    #[arg(long, default_value_t = 10)]
    rate: u32,

    /// Run the sensor in burst mode instead of triggering single measurements
    #[arg(short, long)]
    burst: bool,

    /// Stop after this many seconds (runs until Ctrl+C when omitted)
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,
}

fn options_from_args(args: &Args) -> Result<ConfigOptions, Mlx90393Error> {
    Ok(ConfigOptions::new()
        .gain(Gain::try_from(args.gain)?)
        .resolution(Resolution::try_from(args.resolution)?)
        .oversampling(Oversampling::new(args.oversampling)?)
        .digital_filter(DigitalFilter::new(args.filter)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(args.log_level)?;

    // Validate everything before touching the hardware
    let options = options_from_args(&args)?;

    println!("MLX90393 Magnetometer Reader");
    println!("============================");
    println!("Initializing FT232H I2C interface...");

    let transport = match Ft232hTransport::open_with(args.channel, args.address, args.clock) {
        Ok(t) => t,
        Err(BusError::NoChannelsFound) => {
            eprintln!("Error: No FT232H devices found.");
            eprintln!("Please check:");
            eprintln!("  1. FT232H is connected via USB");
            eprintln!("  2. FTDI drivers are installed");
            eprintln!("  3. No other application is using the device");
            return Err(Box::new(BusError::NoChannelsFound));
        }
        Err(e) => {
            eprintln!("Error opening FT232H channel {}: {}", args.channel, e);
            return Err(Box::new(e));
        }
    };

    let mut sensor = match Mlx90393::new(transport) {
        Ok(s) => s,
        Err(e @ Mlx90393Error::Bus(_)) => {
            eprintln!("Error: MLX90393 did not respond at 0x{:02X}: {}", args.address, e);
            eprintln!("Please check:");
            eprintln!("  1. MLX90393 is properly connected to FT232H I2C pins");
            eprintln!("  2. A0/A1 address pins match --address");
            eprintln!("  3. Pull-up resistors are present on SDA/SCL lines");
            return Err(Box::new(e));
        }
        Err(e) => {
            eprintln!("Error initializing sensor: {}", e);
            return Err(Box::new(e));
        }
    };

    sensor.configure(&options)?;
    let config = *sensor.config();
    info!("sensor configured: {:?}", config);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let axes = Axes::ALL;

    println!("Sensor initialized successfully!");
    println!("Press Ctrl+C to exit\n");

    let start_time = Instant::now();
    let deadline = args.duration;

    // Clear screen once at start
    print!("\x1B[2J\x1B[H");
    io::stdout().flush()?;

    let show = |reading: MagneticReading| {
        let elapsed = start_time.elapsed();

        // Move cursor to top without clearing (reduces flicker)
        print!("\x1B[H");
        println!("MLX90393 Magnetometer - Live Data                              ");
        println!("=================================                              ");
        println!(
            "Time: {:.2}s | Mode: {} | Gain: {:?} | Conversion: {} µs          ",
            elapsed.as_secs_f64(),
            if args.burst { "burst" } else { "single" },
            config.gain,
            config.conversion_time(axes).as_micros()
        );
        println!();
        println!(
            "MAGNETIC FIELD (µT)              -{0:.0} ◄────────┼────────► +{0:.0}",
            FIELD_FULL_SCALE
        );
        for line in format_reading(&reading, FIELD_FULL_SCALE, BAR_WIDTH) {
            println!("{}          ", line);
        }
        println!();
        match reading.magnitude() {
            Some(m) => println!("  |B|: {:9.2} µT          ", m),
            None => println!("  |B|: {:>9} µT          ", "-"),
        }
        match reading.temperature {
            Some(t) => println!("  T:   {:9.2} °C          ", t),
            None => println!("  T:   {:>9} °C          ", "-"),
        }
        println!();
        println!("Press Ctrl+C to exit                                           ");
        let _ = io::stdout().flush();

        let expired = deadline.is_some_and(|d| elapsed >= d);
        if !running.load(Ordering::SeqCst) || expired {
            StreamControl::Break
        } else {
            StreamControl::Continue
        }
    };

    // Burst mode is left again even when streaming fails
    let samples = if args.burst {
        sensor.stream_burst(axes, args.rate, show)?
    } else {
        sensor.stream(axes, args.rate, show)?
    };
    println!(
        "\nStopped after {} samples in {:.2}s",
        samples,
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
