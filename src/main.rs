use decal_studio::{session::UserSession, viewer};

fn main() -> anyhow::Result<()> {
    let session = match UserSession::from_env() {
        Some(session) => session,
        None => {
            println!("Sign in to customize: set CUSTOMIZER_USER to your name and run again.");
            return Ok(());
        }
    };

    println!(
        "Hi {}! Keys: M/D switch product, 1-5 tint, C reset colour, X remove decal, R auto-rotate, 0 reset view. Drop an image on the window to stamp it on.",
        session.display_name
    );
    viewer::run(viewer::StudioOptions::from_env())
}
