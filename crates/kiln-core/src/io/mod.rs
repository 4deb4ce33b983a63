//! External collaborators: source fetching, archive extraction, process
//! invocation and file patching.

pub mod extract;
pub mod fetch;
pub mod invoke;
pub mod patch;

pub use fetch::{DefaultFetcher, FetchError, Fetched, SourceFetcher};
pub use invoke::{BuildTool, Invocation, InvokeError, ProcessInvoker, ToolOutput};
pub use patch::{FilePatcher, PatchError, PatchOutcome, RegexPatcher};

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs::File;
    use std::path::Path;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Write a `.tar.gz` containing `files` (path, contents).
    pub(crate) fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }
}
