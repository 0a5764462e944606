use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Store and serve files for clients, forever
    Serve {
        /// The port to listen on
        #[arg()]
        port: u16,

        /// The directory stored files live in, created if absent
        #[arg(default_value = "./")]
        root: PathBuf,
    },

    /// Store a local file on a server
    Put {
        /// The server address, host:port
        #[arg()]
        address: String,

        /// The file to store
        #[arg()]
        file: PathBuf,
    },

    /// Fetch a stored file from a server
    #[command(alias("dl"))]
    Get {
        /// The server address, host:port
        #[arg()]
        address: String,

        /// The name of the file to fetch
        #[arg()]
        file: PathBuf,

        /// The directory the file will be placed in, created if absent
        #[arg(default_value = "./")]
        dest: PathBuf,
    },
}
