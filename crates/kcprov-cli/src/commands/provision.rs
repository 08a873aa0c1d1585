use super::{
    colorize_outcome, json_pretty, spin_fail, spin_ok, spinner, RequestArgs, RetryArgs,
    EXIT_SUCCESS,
};
use kcprov_core::Provisioner;
use kcprov_remote::{HttpBackend, HttpProbe, RemoteConfig};
use tracing::debug;

pub fn run(request_args: &RequestArgs, retry: &RetryArgs, json: bool) -> Result<u8, String> {
    let request = request_args.resolve()?;
    let options = retry.options();
    debug!(
        "provisioning workspace {} against {} (realm {}, client {}, up to {} probes every {:?})",
        request.workspace_id,
        request.auth_url,
        request.realm,
        request.client,
        options.retry.max_attempts,
        options.retry.interval
    );
    let config = RemoteConfig::new(&request.auth_url).with_timeout(options.timeout);
    let provisioner = Provisioner::new(HttpBackend::new(config), HttpProbe::new(options.timeout))
        .with_policy(options.retry);

    let pb = spinner(&format!("provisioning workspace {}…", request.workspace_id));
    let report = provisioner.provision(&request).map_err(|e| {
        spin_fail(&pb, "provisioning failed");
        e.to_string()
    })?;
    spin_ok(
        &pb,
        &format!(
            "workspace {} provisioned in realm {}",
            report.workspace_id, report.realm
        ),
    );

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for step in &report.steps {
            eprintln!("  {:<16} {}", step.step.to_string(), colorize_outcome(step.outcome));
        }
        println!("{}", report.secret);
    }
    Ok(EXIT_SUCCESS)
}
