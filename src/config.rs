//! Process configuration (spec.md §4.2, §9): the CLI surface for starting
//! a node solo or joining an existing overlay.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "can-node", about = "A node in a Content Addressable Network")]
pub struct Config {
    /// Dimensionality of the coordinate space the overlay is embedded in.
    #[arg(short = 'd', long, default_value_t = 2)]
    pub dimension: usize,

    /// Replication factor. Carried through JOIN and neighbor messages but
    /// does not change routing or storage behavior in this implementation.
    /// Must be at least 1.
    #[arg(short = 'r', long, default_value_t = 1)]
    pub redundancy: usize,

    /// Port this node listens on and advertises to peers.
    #[arg(short = 'p', long, default_value_t = 3000)]
    pub port: u16,

    /// `host:port` of an existing node to join through. A key to hash for
    /// the JOIN point is read from stdin when this is set.
    #[arg(long)]
    pub join: Option<String>,
}
