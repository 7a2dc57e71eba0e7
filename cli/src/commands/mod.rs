use clap::Subcommand;

use self::{client::ClientCommand, server::ServerCommand};

pub mod client;
pub mod server;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 🚀 Start Server
    ///
    /// Run the render group and serve composited frames to display clients.
    Server(ServerCommand),

    /// 🖼️ Display Client
    ///
    /// Connect to a server and display (or save) the delivered frames.
    Client(ClientCommand),
}
