//! `wayfinder routes`: show the model chain for each purpose.

use std::fmt::Write;
use std::path::Path;
use wayfinder_core::Purpose;
use wayfinder_providers::ModelRouter;

pub fn run(path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let router = ModelRouter::from_config(&config.models);

    if json {
        println!("{}", serde_json::to_string_pretty(&router.status())?);
    } else {
        print!("{}", render(&router));
    }
    Ok(())
}

/// One block per purpose listing its descriptors in failover order.
pub fn render(router: &ModelRouter) -> String {
    let mut out = String::new();
    for purpose in Purpose::ALL {
        let _ = writeln!(out, "{purpose}:");
        for (i, descriptor) in router.chain(purpose).iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({}) cooldown {}s",
                i + 1,
                descriptor.name,
                descriptor.backend,
                descriptor.cooldown.as_secs()
            );
        }
    }

    let status = router.status();
    let _ = writeln!(
        out,
        "\n{}/{} models available",
        status.available_models.len(),
        status.total_models
    );
    out
}
