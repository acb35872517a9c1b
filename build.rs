use std::env;
use std::path::PathBuf;

use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;

fn main() -> Result<()> {
    // Rerun when the bundled models change.
    println!("cargo:rerun-if-changed=assets/*");

    let out_dir = env::var("OUT_DIR")?;
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    if manifest_dir.join("assets").exists() {
        let mut copy_options = CopyOptions::new();
        copy_options.overwrite = true;
        copy_items(&["assets/"], out_dir, &copy_options)?;
    }

    Ok(())
}
