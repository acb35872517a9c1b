//! Asset IO: reading bundled files on native and fetching them on the web.

use anyhow::Context as _;

/// Directory the bundled assets are read from. Overridable through
/// `CUSTOMIZER_ASSETS`, otherwise `assets/` next to the working directory.
#[cfg(not(target_arch = "wasm32"))]
pub fn assets_root() -> std::path::PathBuf {
    std::env::var_os("CUSTOMIZER_ASSETS")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("assets"))
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> reqwest::Url {
    let window = web_sys::window().unwrap();
    let location = window.location();
    let origin = location.origin().unwrap();
    let base = reqwest::Url::parse(&format!("{}/assets/", origin)).unwrap();
    base.join(file_name).unwrap()
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name);
        reqwest::get(url).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = resolve(file_name);
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
    };

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name);
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = resolve(file_name);
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?
    };

    Ok(data)
}

/// Bundled assets resolve under [`assets_root`]; dropped files arrive as
/// absolute paths and are read as-is.
#[cfg(not(target_arch = "wasm32"))]
fn resolve(file_name: &str) -> std::path::PathBuf {
    let path = std::path::Path::new(file_name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        assets_root().join(path)
    }
}

/// Decode user-supplied image bytes into pixels, off the event loop.
/// Failures surface to the caller; malformed files are a log line, never a
/// crash.
pub fn decode_image(bytes: &[u8]) -> anyhow::Result<image::DynamicImage> {
    image::load_from_memory(bytes).context("decoding image")
}
