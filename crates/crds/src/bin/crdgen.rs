//! Prints the CRD manifests owned by WAOFed as a multi-document YAML stream.

use crds::{ServiceLoadbalancingPreference, WAOFedConfig};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [WAOFedConfig::crd(), ServiceLoadbalancingPreference::crd()];
    for crd in &crds {
        println!("---");
        print!("{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
