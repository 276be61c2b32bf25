#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use anyhow::Result;
use clap::Parser;

mod build;
mod cli;
mod config;
mod constants;
mod ctx;
mod errors;
mod git;
mod review;
mod revision;
mod session;
mod subcommands;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Cli::parse().run().await
}
