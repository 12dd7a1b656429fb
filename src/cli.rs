use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(
        long,
        global = true,
        value_name = "USER@HOST[:PORT]",
        help = "FTP server to use instead of the configured one"
    )]
    pub server: Option<String>,
    #[clap(
        long,
        global = true,
        env = "FTPC_PASSWORD",
        hide_env_values = true,
        help = "Login password (anonymous login when omitted)"
    )]
    pub password: Option<String>,
    #[clap(short, long, global = true, help = "Print verbose diagnostic logs for debugging")]
    pub verbose: bool,
    #[clap(long, global = true, help = "Print one JSON object per transfer plus a summary")]
    pub json: bool,
    #[clap(short, long, global = true, help = "Hide progress bars")]
    pub quiet: bool,
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[clap(about = "Upload local files to the FTP server", display_order = 1)]
    Put {
        #[clap(num_args = 1.., required = true, help = "Local files to upload")]
        sources: Vec<String>,
        #[clap(
            required = true,
            help = "Remote file, or remote directory when ending in '/' or with several sources"
        )]
        target: String,
    },
    #[clap(about = "Download remote files from the FTP server", display_order = 2)]
    Get {
        #[clap(num_args = 1.., required = true, help = "Remote files to download")]
        sources: Vec<String>,
        #[clap(required = true, help = "Local file, or local directory when ending in '/'")]
        target: String,
    },
    #[clap(about = "Print the token a transfer would be tracked under", display_order = 3)]
    #[clap(group(ArgGroup::new("direction").required(true).args(["upload", "download"])))]
    Token {
        #[clap(long, help = "Token of an upload")]
        upload: bool,
        #[clap(long, help = "Token of a download")]
        download: bool,
        local: String,
        remote: String,
    },
    #[clap(about = "Configure ftpc (--server is saved as the default server)", display_order = 4)]
    Set {
        #[clap(long = "max-uploads", help = "Maximum concurrent uploads")]
        max_uploads: Option<usize>,
        #[clap(long = "max-downloads", help = "Maximum concurrent downloads")]
        max_downloads: Option<usize>,
        #[clap(long = "chunk-size", help = "Stream chunk size in bytes")]
        chunk_size: Option<usize>,
        #[clap(long = "connect-timeout", help = "Connect timeout in seconds")]
        connect_timeout: Option<u64>,
        #[clap(long = "io-timeout", help = "Read/write timeout in seconds")]
        io_timeout: Option<u64>,
    },
}
