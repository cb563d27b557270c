use super::{core_err, json_pretty, Checkout, EXIT_SUCCESS};
use gitenv_core::SnapshotTagger;

pub fn run(uri: &str, push: bool, json: bool) -> Result<u8, String> {
    let checkout = Checkout::clone(uri)?;
    let repo = &checkout.repo;

    let mut created = Vec::new();
    let snapshots = SnapshotTagger::new(repo)
        .tag_new_snapshots()
        .map_err(|e| core_err(&e))?;
    for tag in snapshots {
        let tag = tag.map_err(|e| core_err(&e))?;
        if push {
            if !json {
                println!("Pushing tag {}", tag.name);
            }
            repo.push_tag(&tag.name).map_err(|e| core_err(&e.into()))?;
        } else if !json {
            println!("Created tag {}", tag.name);
        }
        created.push(tag.name);
    }

    if json {
        println!("{}", json_pretty(&serde_json::json!({ "tags": created }))?);
    }
    Ok(EXIT_SUCCESS)
}
