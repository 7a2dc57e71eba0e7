use clap::Parser;

/// 🖼️ Client Command
///
/// This command connects a display client 🔌 to a running server.
#[derive(Parser, Debug)]
#[command(name = "client", about = "🖼️ Display frames delivered by a server.", long_about = None)]
pub struct ClientCommand {
    /// 🏷️ Client name
    ///
    /// Shown in the server logs. A random one is generated if not set.
    #[arg(short, long)]
    pub name: Option<String>,

    /// 📌 Server IP address
    ///
    /// Address 🌐 of the server to connect to. Default is localhost.
    #[arg(short, long)]
    pub address: Option<String>,

    /// 🚪 Server port
    ///
    /// Port 🎛️ of the server to connect to. Default is 8787.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 🗜️ SQUIRT compression level
    ///
    /// Enables lossy frame compression at the given level (0-5, 0 is
    /// lossless). Compression stays off when this flag is absent.
    #[arg(long, value_name = "LEVEL")]
    pub squirt: Option<u8>,

    /// ⏱️ Desired update rate
    ///
    /// Target frames per second 🎯 the server tunes its image reduction
    /// for. Zero keeps every frame at full resolution. Default is 10.
    #[arg(short, long, value_name = "FPS")]
    pub update_rate: Option<f64>,

    /// 💾 Save directory
    ///
    /// When set, every delivered frame is also written there as a PNG.
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<String>,

    /// 🙈 Headless mode
    ///
    /// Stream without opening the viewer window.
    #[arg(long)]
    pub headless: bool,
}
