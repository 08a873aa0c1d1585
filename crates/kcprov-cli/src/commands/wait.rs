use super::{json_pretty, load_request_file, spin_fail, spin_ok, spinner, RetryArgs, EXIT_SUCCESS};
use kcprov_core::wait_until_ready;
use kcprov_remote::{HttpProbe, RemoteConfig};
use std::path::Path;
use tracing::debug;

pub fn run(
    url: Option<&str>,
    config: Option<&Path>,
    retry: &RetryArgs,
    json: bool,
) -> Result<u8, String> {
    let url = match url {
        Some(u) => u.to_owned(),
        None => load_request_file(config)?.auth_url.ok_or_else(|| {
            "request error: no --url given and no auth_url in the request file".to_owned()
        })?,
    };
    let url = RemoteConfig::new(&url).url;
    let options = retry.options();
    let probe = HttpProbe::new(options.timeout);
    debug!(
        "waiting for {url}: up to {} probes, budget {:?}",
        options.retry.max_attempts,
        options.retry.budget()
    );

    let pb = spinner(&format!("waiting for {url}…"));
    let attempts = wait_until_ready(&probe, &url, options.retry).map_err(|e| {
        spin_fail(&pb, "identity service unavailable");
        e.to_string()
    })?;
    spin_ok(&pb, &format!("{url} is up"));

    if json {
        let payload = serde_json::json!({
            "url": url,
            "ready": true,
            "attempts": attempts,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{url} ready after {attempts} attempt(s)");
    }
    Ok(EXIT_SUCCESS)
}
