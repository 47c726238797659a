use clap::Parser;
use mkimage::{Args, ImageError};

fn main() -> Result<(), ImageError> {
    let args = Args::parse();
    let header = mkimage::run(&args)?;
    eprintln!(
        "wrote {} ({} kernel sectors)",
        args.output.display(),
        header.kernel_sectors
    );
    Ok(())
}
