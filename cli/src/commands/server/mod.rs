use clap::Parser;
use shared::compositing::CompositeStrategy;

/// 🖥️ Server Command
///
/// This command is used to configure and 🚀 start the server.
#[derive(Parser, Debug)]
#[command(name = "server", about = "🚀 Start the render group and serve frames.", long_about = None)]
pub struct ServerCommand {
    /// 📌 Server IP address
    ///
    /// Specify the IP address 🌐 where the server will listen for display
    /// clients. Default is localhost.
    #[arg(short, long, value_name = "ADDRESS")]
    pub address: Option<String>,

    /// 🚪 Server port
    ///
    /// Define the port number 🎛️ on which the server will listen.
    /// Default is 8787 if not specified.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// 📏 Image width
    ///
    /// Full-resolution width 📐 of the composited image in pixels.
    #[arg(long, value_name = "WIDTH")]
    pub width: Option<u32>,

    /// 📐 Image height
    ///
    /// Full-resolution height 🧱 of the composited image in pixels.
    #[arg(long, value_name = "HEIGHT")]
    pub height: Option<u32>,

    /// 👥 Render ranks
    ///
    /// Number of ranks in the sort-last render group. Default is 4.
    #[arg(short, long, value_name = "RANKS")]
    pub ranks: Option<usize>,

    /// 🔀 Compositing strategy
    ///
    /// Either "tree" or "binary-swap". Default is tree.
    #[arg(short, long, value_name = "STRATEGY")]
    pub strategy: Option<CompositeStrategy>,

    /// 🔍 Maximum reduction factor
    ///
    /// Upper bound for the adaptive image reduction factor. Default is 16.
    #[arg(long, value_name = "FACTOR")]
    pub max_reduction_factor: Option<u32>,
}
