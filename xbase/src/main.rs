use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xbase::storage::ByteStore;
use xbase::{FileStore, Index, IndexConfig, IndexError, MdxFile, Ndx};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xbase=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match IndexConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let Some(path) = std::env::args().nth(1) else {
        tracing::error!("usage: xbase <file.mdx|file.ndx>");
        std::process::exit(2);
    };
    let path = Path::new(&path);

    let store = match FileStore::open(path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let result = match extension.as_deref() {
        Some("ndx") => {
            let name = path
                .file_stem()
                .map_or_else(String::new, |stem| stem.to_string_lossy().to_ascii_uppercase());
            describe_ndx(store, &name, config)
        }
        _ => describe_mdx(store, config),
    };

    if let Err(e) = result {
        tracing::error!("Failed to read {}: {e}", path.display());
        std::process::exit(1);
    }
}

fn describe_mdx<S: ByteStore>(store: S, config: IndexConfig) -> Result<(), IndexError> {
    let mut mdx = MdxFile::open(store, config)?;
    tracing::info!(
        "MDX file for table {} with {} tags",
        mdx.table_name(),
        mdx.tag_count()
    );
    for name in mdx.tag_names()? {
        let mut tag = mdx.mdx(&name)?;
        let entries = tag.entry_count()?;
        describe(&tag, tag.root(), entries);
    }
    Ok(())
}

fn describe_ndx<S: ByteStore>(store: S, name: &str, config: IndexConfig) -> Result<(), IndexError> {
    let mut ndx = Ndx::open(store, name, config)?;
    let entries = ndx.entry_count()?;
    describe(&ndx, ndx.root(), entries);
    Ok(())
}

fn describe(index: &dyn Index, root: u32, entries: usize) {
    let definition = index.definition();
    tracing::info!(
        tag = index.name(),
        expression = definition.expression(),
        key_type = %definition.key_type(),
        key_length = definition.key_length(),
        unique = definition.is_unique(),
        root,
        entries,
        "tag"
    );
}
