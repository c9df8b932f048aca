//! CAM Local Dynamic Map CLI
//!
//! Listens for local CAMs and periodically prints the latest one of every
//! station.

use camldm::{
    collector::{CollectorBuilder, StatsSnapshot},
    ldm::CamFilter,
    protocol,
    time,
    transport::{CamSender, DEFAULT_PORT},
    types::{Cam, CamField},
};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "camldm")]
#[command(about = "Rendits Local Dynamic Map", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive CAMs and report the map periodically
    Listen {
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: IpAddr,

        /// Port to receive local CAMs on
        #[arg(short, long, env = "CAMLDM_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Report interval in seconds
        #[arg(short, long, default_value = "2")]
        interval: u64,

        /// Only report CAMs at most this many milliseconds old
        #[arg(long)]
        max_age: Option<i64>,

        /// Reference longitude for distance filtering (1e-7 degree)
        #[arg(long, requires = "lat")]
        lon: Option<f64>,

        /// Reference latitude for distance filtering (1e-7 degree)
        #[arg(long, requires = "lon")]
        lat: Option<f64>,

        /// Only report CAMs within this distance of lon/lat (1e-7 degree)
        #[arg(long)]
        max_distance: Option<f64>,
    },

    /// Decode a single CAM from a file (raw or base64)
    Decode {
        /// Path to the datagram file
        file: PathBuf,
    },

    /// Send synthetic CAMs, stamped with the current time
    Send {
        /// Destination address
        #[arg(short, long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
        to: SocketAddr,

        /// Station id of the sender
        #[arg(short, long)]
        station_id: u32,

        /// Latitude (1e-7 degree)
        #[arg(long)]
        lat: Option<i32>,

        /// Longitude (1e-7 degree)
        #[arg(long)]
        lon: Option<i32>,

        /// Speed (cm/s)
        #[arg(long)]
        speed: Option<i32>,

        /// Heading (0.1 degree)
        #[arg(long)]
        heading: Option<i32>,

        /// Number of messages to send
        #[arg(short, long, default_value = "1")]
        count: u32,

        /// Delay between messages in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Listen {
            bind,
            port,
            interval,
            max_age,
            lon,
            lat,
            max_distance,
        } => {
            let mut report_filter = CamFilter {
                position: lon.zip(lat),
                max_distance,
                max_age,
            };
            if report_filter.max_distance.is_none() {
                report_filter.position = None;
            }

            run_listener(SocketAddr::new(bind, port), interval, report_filter).await?;
        }

        Commands::Decode { file } => {
            decode_file(&file)?;
        }

        Commands::Send {
            to,
            station_id,
            lat,
            lon,
            speed,
            heading,
            count,
            interval_ms,
        } => {
            send_cams(to, station_id, [lat, lon, speed, heading], count, interval_ms).await?;
        }
    }

    Ok(())
}

async fn run_listener(
    addr: SocketAddr,
    interval: u64,
    report_filter: CamFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting Local Dynamic Map");
    tracing::info!("Report interval: {}s", interval);
    tracing::info!("Report filter: {:?}", report_filter);

    let collector = CollectorBuilder::new()
        .bind_addr(addr)
        .report_interval(Duration::from_secs(interval.max(1)))
        .report_filter(report_filter)
        .build()?;

    let stats = collector.stats();
    let ldm = collector.ldm();
    let running = collector.running_flag();

    let mut collector_handle = tokio::spawn(async move { collector.run().await });

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        result = &mut collector_handle => {
            log_outcome(result);
            false
        }
    };

    if interrupted {
        tracing::info!("Received Ctrl+C, shutting down...");
        running.store(false, Ordering::SeqCst);
        log_outcome(collector_handle.await);
    }

    let StatsSnapshot {
        datagrams_received,
        cams_stored,
        errors,
        bytes_received,
        reports,
    } = stats.snapshot();
    tracing::info!("Final statistics:");
    tracing::info!("  Stations tracked: {}", ldm.len());
    tracing::info!("  Datagrams received: {}", datagrams_received);
    tracing::info!("  CAMs stored: {}", cams_stored);
    tracing::info!("  Errors: {}", errors);
    tracing::info!("  Bytes received: {}", bytes_received);
    tracing::info!("  Reports: {}", reports);

    Ok(())
}

fn log_outcome(
    result: Result<Result<(), camldm::collector::CollectorError>, tokio::task::JoinError>,
) {
    match result {
        Ok(Err(e)) => tracing::error!("Collector error: {}", e),
        Err(e) => tracing::error!("Collector task failed: {}", e),
        Ok(Ok(())) => {}
    }
}

fn decode_file(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(path)?;

    tracing::info!("Decoding file: {} ({} bytes)", path.display(), data.len());

    let cam = protocol::parse_datagram(&data)?;

    println!("CAM from station {}", cam.station_id());
    println!("  Timestamp (ITS): {} ms", cam.timestamp());
    println!("  Age: {} ms", cam.age());
    println!();
    for (field, value) in cam.fields() {
        match cam.available(field) {
            Some(_) => println!("  {:<38} {}", field, value),
            None => println!("  {:<38} {} (unavailable)", field, value),
        }
    }

    Ok(())
}

async fn send_cams(
    to: SocketAddr,
    station_id: u32,
    [lat, lon, speed, heading]: [Option<i32>; 4],
    count: u32,
    interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let sender = CamSender::connect(to).await?;

    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }

        let cam = Cam::builder()
            .station_id(station_id)
            .gen_delta_time(time::gdt_from_its(time::now_its()))
            .set_opt(CamField::Latitude, lat)
            .set_opt(CamField::Longitude, lon)
            .set_opt(CamField::Speed, speed)
            .set_opt(CamField::Heading, heading)
            .build()?;

        sender.send(&cam).await?;
        tracing::info!("Sent {} to {}", cam, to);
    }

    Ok(())
}
