use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use subflow_core::{
    decode_datagram, device_tag, Engine, EngineConfig, EventFrame, Frame, FrameSink,
    HeadlessRenderer, InboundEvent, InboxSender, Recorder, RecordingSettings, SubflowError,
};
use tracing_subscriber::EnvFilter;

fn main() -> subflow_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Simulate {
            script,
            fps,
            duration,
            output,
            every,
        } => run_simulate(config, &script, fps, duration, output.as_deref(), every),
        Commands::Listen {
            udp_port,
            tcp_port,
            fps,
            frames,
        } => run_listen(config, udp_port, tcp_port, fps, frames),
        Commands::Checksum { id } => {
            println!("{}", device_tag(&id));
            Ok(())
        }
    }
}

/// One line of a simulation script.
#[derive(Debug, Deserialize)]
struct ScriptLine {
    at: f64,
    event: InboundEvent,
}

fn load_script(path: &Path) -> subflow_core::Result<Vec<ScriptLine>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = serde_json::from_str(trimmed).map_err(|err| {
            SubflowError::msg(format!("{}:{}: {err}", path.display(), index + 1))
        })?;
        lines.push(parsed);
    }
    lines.sort_by(|a, b| a.at.total_cmp(&b.at));
    Ok(lines)
}

fn frame_step(fps: u32) -> subflow_core::Result<f64> {
    if fps == 0 {
        return Err(SubflowError::msg("fps must be positive"));
    }
    Ok(1.0 / fps as f64)
}

fn run_simulate(
    config: EngineConfig,
    script: &Path,
    fps: u32,
    duration: Option<f64>,
    output: Option<&Path>,
    every: u32,
) -> subflow_core::Result<()> {
    let step = frame_step(fps)?;
    let events = load_script(script)?;
    let duration = duration.unwrap_or_else(|| events.last().map_or(0.0, |line| line.at) + 5.0);
    tracing::info!(?script, events = events.len(), duration, fps, "starting simulation");

    let (mut engine, sender) = Engine::new(config, 0.0);
    match output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            let mut recorder = Recorder::new(writer, RecordingSettings { every_nth: every });
            recorder.start()?;
            simulate(&mut engine, &sender, events, step, duration, &mut recorder)?;
            recorder.stop()?;
            tracing::info!(?path, frames = recorder.frames_written(), "frames recorded");
        }
        None => {
            let mut renderer = HeadlessRenderer::new();
            simulate(&mut engine, &sender, events, step, duration, &mut renderer)?;
        }
    }
    Ok(())
}

fn simulate<S: FrameSink>(
    engine: &mut Engine,
    sender: &InboxSender,
    events: Vec<ScriptLine>,
    step: f64,
    duration: f64,
    sink: &mut S,
) -> subflow_core::Result<()> {
    let total = (duration / step).ceil().max(0.0) as u64;
    let delta = Duration::from_secs_f64(step);
    let mut pending = events.into_iter().peekable();
    let mut visible = 0u64;
    let mut last: Option<Frame> = None;

    for index in 0..total {
        let now = index as f64 * step;
        while let Some(line) = pending.next_if(|line| line.at <= now) {
            if let Err(err) = sender.send(line.event) {
                tracing::warn!(%err, at = line.at, "script event dropped");
            }
        }
        let frame = engine.tick(now, delta);
        visible += u64::from(frame.visible);
        sink.submit(&frame)?;
        last = Some(frame);
    }

    tracing::info!(
        ticks = engine.ticks(),
        visible,
        mode = ?last.as_ref().map(|frame| frame.mode),
        period = engine.pulse().period(),
        remote_bpm = engine.pulse().remote_bpm(),
        sequence_loaded = engine.sequencer().is_loaded(),
        "simulation finished"
    );
    Ok(())
}

fn run_listen(
    config: EngineConfig,
    udp_port: u16,
    tcp_port: u16,
    fps: u32,
    frames: Option<u64>,
) -> subflow_core::Result<()> {
    let step = Duration::from_secs_f64(frame_step(fps)?);
    let (mut engine, sender) = Engine::new(config, 0.0);

    let socket = UdpSocket::bind(("0.0.0.0", udp_port))?;
    let listener = TcpListener::bind(("0.0.0.0", tcp_port))?;
    tracing::info!(udp_port, tcp_port, fps, "listening for events");

    let udp_sender = sender.clone();
    thread::spawn(move || receive_datagrams(socket, udp_sender));
    thread::spawn(move || accept_streams(listener, sender));

    let mut renderer = HeadlessRenderer::new();
    let start = Instant::now();
    let mut previous = start;
    let mut next_deadline = start + step;
    loop {
        if frames.is_some_and(|limit| renderer.frames_submitted() >= limit) {
            break;
        }
        let tick_start = Instant::now();
        let delta = tick_start - previous;
        previous = tick_start;

        let frame = engine.tick((tick_start - start).as_secs_f64(), delta);
        renderer.submit(&frame)?;

        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        }
        next_deadline += step;
    }
    tracing::info!(frames = renderer.frames_submitted(), "listener stopped");
    Ok(())
}

const RECEIVE_RETRY: Duration = Duration::from_millis(250);

/// Pushes an event into the inbox. Returns false once the engine is gone.
fn forward(sender: &InboxSender, event: InboundEvent) -> bool {
    match sender.send(event) {
        Err(SubflowError::InboxClosed) => false,
        // A full inbox already logged the drop.
        Ok(()) | Err(_) => true,
    }
}

fn receive_datagrams(socket: UdpSocket, sender: InboxSender) {
    let mut buf = [0u8; 2048];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) => {
                tracing::warn!(%err, "datagram receive failed");
                thread::sleep(RECEIVE_RETRY);
                continue;
            }
        };
        match decode_datagram(&buf[..len]) {
            Ok(event) => {
                tracing::debug!(%peer, len, "program datagram");
                if !forward(&sender, event) {
                    break;
                }
            }
            Err(err) => tracing::warn!(%err, %peer, "dropping datagram"),
        }
    }
    tracing::info!("datagram receiver stopped");
}

fn accept_streams(listener: TcpListener, sender: InboxSender) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let sender = sender.clone();
                thread::spawn(move || read_frames(stream, sender));
            }
            Err(err) => {
                tracing::warn!(%err, "stream accept failed");
                thread::sleep(RECEIVE_RETRY);
            }
        }
    }
}

fn read_frames(stream: TcpStream, sender: InboxSender) {
    let peer = stream.peer_addr().ok();
    tracing::info!(?peer, "stream connected");
    let frames = serde_json::Deserializer::from_reader(BufReader::new(stream))
        .into_iter::<EventFrame>();
    for frame in frames {
        match frame {
            Ok(frame) => {
                if !forward(&sender, InboundEvent::Frame(frame)) {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(%err, ?peer, "dropping stream after malformed frame");
                break;
            }
        }
    }
    tracing::info!(?peer, "stream closed");
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Tempo-driven instanced animation engine", long_about = None)]
struct Cli {
    /// Optional JSON file overriding engine defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines event script on a fixed-step clock.
    Simulate {
        /// Script with one `{ "at": secs, "event": ... }` object per line.
        #[arg(short, long)]
        script: PathBuf,
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Seconds to simulate; defaults to five seconds past the last event.
        #[arg(long)]
        duration: Option<f64>,
        /// Write frames as JSON lines to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Record only every Nth frame.
        #[arg(long, default_value_t = 1)]
        every: u32,
    },
    /// Receive programs over UDP and event frames over TCP.
    Listen {
        #[arg(long, default_value_t = 37020)]
        udp_port: u16,
        #[arg(long, default_value_t = 37023)]
        tcp_port: u16,
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Stop after this many frames.
        #[arg(long)]
        frames: Option<u64>,
    },
    /// Print the CRC-8 device tag for an identifier.
    Checksum { id: String },
}
