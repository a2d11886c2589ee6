use crate::http::HttpClient;
use crate::{ContentFetcher, RemoteError};
use flate2::read::GzDecoder;
use layerwright_schema::{Checksum, DependencyDescriptor};
use sha2::{Digest, Sha256, Sha512};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8; 5] = b"ustar";

/// Fetches `http(s)://` and `file://` artifacts, verifies them against the
/// descriptor checksum and installs them.
///
/// Gzip tarballs and plain tarballs are unpacked honouring
/// `strip_components`; anything else is installed as `bin/<id>` with mode
/// 0755.
pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: HttpClient::new(),
        }
    }

    fn download(&self, uri: &str, out: &mut File) -> Result<u64, RemoteError> {
        if let Some(path) = uri.strip_prefix("file://") {
            debug!("reading {path}");
            let mut src = File::open(path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => RemoteError::NotFound(uri.to_owned()),
                _ => RemoteError::Io(e),
            })?;
            return Ok(io::copy(&mut src, out)?);
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return self.client.download(uri, out);
        }
        Err(RemoteError::Config(format!("unsupported artifact URI '{uri}'")))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch(
        &self,
        descriptor: &DependencyDescriptor,
        destination: &Path,
    ) -> Result<(), RemoteError> {
        info!("Downloading {} {} from {}", descriptor.id, descriptor.version, descriptor.uri);
        let mut tmp = NamedTempFile::new()?;
        let size = self.download(&descriptor.uri, tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        debug!("downloaded {size} bytes");

        let file = tmp.as_file_mut();
        file.seek(SeekFrom::Start(0))?;
        verify_checksum(&descriptor.uri, &descriptor.checksum, file)?;
        debug!("checksum verified: {}", descriptor.checksum);

        file.seek(SeekFrom::Start(0))?;
        match detect_kind(file)? {
            ArtifactKind::TarGz => {
                file.seek(SeekFrom::Start(0))?;
                let decoder = GzDecoder::new(BufReader::new(&*file));
                unpack(Archive::new(decoder), destination, descriptor.strip_components)?;
            }
            ArtifactKind::Tar => {
                file.seek(SeekFrom::Start(0))?;
                unpack(
                    Archive::new(BufReader::new(&*file)),
                    destination,
                    descriptor.strip_components,
                )?;
            }
            ArtifactKind::Executable => {
                install_executable(tmp.path(), destination, descriptor.id.as_str())?;
            }
        }
        Ok(())
    }
}

/// Hash `reader` with the algorithm named by `expected` and compare.
pub fn verify_checksum(
    key: &str,
    expected: &Checksum,
    reader: &mut impl Read,
) -> Result<(), RemoteError> {
    let actual = digest_hex(expected.algorithm(), reader)?;
    if actual.eq_ignore_ascii_case(expected.hash()) {
        Ok(())
    } else {
        Err(RemoteError::IntegrityFailure {
            key: key.to_owned(),
            expected: expected.to_string(),
            actual: format!("{}:{actual}", expected.algorithm()),
        })
    }
}

/// Hex digest of everything `reader` yields.
pub fn digest_hex(algorithm: &str, reader: &mut impl Read) -> Result<String, RemoteError> {
    match algorithm.to_ascii_lowercase().as_str() {
        "sha256" => {
            let mut hasher = Sha256::new();
            io::copy(reader, &mut hasher)?;
            Ok(hex::encode(hasher.finalize()))
        }
        "sha512" => {
            let mut hasher = Sha512::new();
            io::copy(reader, &mut hasher)?;
            Ok(hex::encode(hasher.finalize()))
        }
        "blake3" => {
            let mut hasher = blake3::Hasher::new();
            io::copy(reader, &mut hasher)?;
            Ok(hasher.finalize().to_hex().to_string())
        }
        other => Err(RemoteError::UnsupportedAlgorithm(other.to_owned())),
    }
}

enum ArtifactKind {
    TarGz,
    Tar,
    Executable,
}

fn detect_kind(file: &mut File) -> Result<ArtifactKind, RemoteError> {
    let mut header = [0u8; TAR_MAGIC_OFFSET + 5];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled >= 2 && header[..2] == GZIP_MAGIC {
        Ok(ArtifactKind::TarGz)
    } else if filled == header.len() && &header[TAR_MAGIC_OFFSET..] == TAR_MAGIC {
        Ok(ArtifactKind::Tar)
    } else {
        Ok(ArtifactKind::Executable)
    }
}

fn unpack<R: Read>(
    mut archive: Archive<R>,
    destination: &Path,
    strip_components: usize,
) -> Result<(), RemoteError> {
    fs::create_dir_all(destination)?;
    let mut count = 0usize;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let stripped = strip_path(&path, strip_components)?;
        let Some(stripped) = stripped else {
            continue;
        };
        reject_symlinked_ancestor(destination, &stripped)?;
        let dest_path = destination.join(&stripped);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let kind = entry.header().entry_type();
        if kind.is_symlink() {
            let target = link_target(&entry, &path)?;
            check_symlink_target(&stripped, &target)?;
            entry.unpack(&dest_path)?;
        } else if kind.is_hard_link() {
            let target = link_target(&entry, &path)?;
            let Some(target) = strip_path(&target, strip_components)? else {
                return Err(escapes(&path));
            };
            reject_symlinked_ancestor(destination, &target)?;
            fs::hard_link(destination.join(target), &dest_path)?;
        } else {
            entry.unpack(&dest_path)?;
        }
        count += 1;
    }
    debug!("unpacked {count} entries into {}", destination.display());
    Ok(())
}

/// Drop the first `n` components. `None` if nothing remains; error on any
/// component that could escape the destination.
fn strip_path(path: &Path, n: usize) -> Result<Option<PathBuf>, RemoteError> {
    let mut out = PathBuf::new();
    let mut seen = 0;
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if seen >= n {
                    out.push(part);
                }
                seen += 1;
            }
            Component::CurDir => {}
            _ => return Err(escapes(path)),
        }
    }
    Ok((!out.as_os_str().is_empty()).then_some(out))
}

fn escapes(path: &Path) -> RemoteError {
    RemoteError::Archive(format!("entry '{}' escapes the destination", path.display()))
}

fn link_target<R: Read>(entry: &tar::Entry<'_, R>, path: &Path) -> Result<PathBuf, RemoteError> {
    entry
        .link_name()?
        .map(|t| t.into_owned())
        .ok_or_else(|| RemoteError::Archive(format!("link '{}' has no target", path.display())))
}

/// Refuse to write through a symlink already present on the way to `rel`.
fn reject_symlinked_ancestor(destination: &Path, rel: &Path) -> Result<(), RemoteError> {
    let mut current = destination.to_path_buf();
    for part in rel.components() {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Err(escapes(rel)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// A symlink at `rel` may only point at a relative path that stays inside
/// the destination.
fn check_symlink_target(rel: &Path, target: &Path) -> Result<(), RemoteError> {
    let mut depth = rel.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            _ => return Err(escapes(rel)),
        }
    }
    Ok(())
}

fn install_executable(src: &Path, destination: &Path, id: &str) -> Result<(), RemoteError> {
    let bin_dir = destination.join("bin");
    fs::create_dir_all(&bin_dir)?;
    let dest = bin_dir.join(id);
    fs::copy(src, &dest)?;
    set_executable(&dest)?;
    debug!("installed {}", dest.display());
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn sha256_of(data: &[u8]) -> String {
        format!("sha256:{}", hex::encode(Sha256::digest(data)))
    }

    fn descriptor_for(path: &Path, checksum: String) -> DependencyDescriptor {
        DependencyDescriptor::new(
            "pnpm",
            "8.6.0",
            checksum,
            format!("file://{}", path.display()),
        )
    }

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn raw_artifact_installs_executable() {
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("pnpm-linux-x64");
        fs::write(&artifact, b"#!/bin/sh\necho pnpm\n").unwrap();
        let dest = tempfile::tempdir().unwrap();

        let d = descriptor_for(&artifact, sha256_of(b"#!/bin/sh\necho pnpm\n"));
        HttpFetcher::new().fetch(&d, dest.path()).unwrap();

        let installed = dest.path().join("bin").join("pnpm");
        assert_eq!(fs::read(&installed).unwrap(), b"#!/bin/sh\necho pnpm\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&installed).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn checksum_mismatch_installs_nothing() {
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("pnpm");
        fs::write(&artifact, b"tampered").unwrap();
        let dest = tempfile::tempdir().unwrap();

        let d = descriptor_for(&artifact, sha256_of(b"original"));
        let err = HttpFetcher::new().fetch(&d, dest.path()).unwrap_err();
        assert!(matches!(err, RemoteError::IntegrityFailure { .. }));
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn tarball_is_unpacked_with_strip_components() {
        let data = tarball(&[
            ("package/bin/pnpm.cjs", b"js"),
            ("package/package.json", b"{}"),
        ]);
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("pnpm.tgz");
        fs::write(&artifact, &data).unwrap();
        let dest = tempfile::tempdir().unwrap();

        let mut d = descriptor_for(&artifact, sha256_of(&data));
        d.strip_components = 1;
        HttpFetcher::new().fetch(&d, dest.path()).unwrap();

        assert_eq!(fs::read(dest.path().join("bin/pnpm.cjs")).unwrap(), b"js");
        assert!(dest.path().join("package.json").exists());
        assert!(!dest.path().join("package").exists());
    }

    #[test]
    fn blake3_checksums_are_verified() {
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("pnpm");
        fs::write(&artifact, b"bin").unwrap();
        let dest = tempfile::tempdir().unwrap();

        let checksum = format!("blake3:{}", blake3::hash(b"bin").to_hex());
        HttpFetcher::new()
            .fetch(&descriptor_for(&artifact, checksum), dest.path())
            .unwrap();
        assert!(dest.path().join("bin/pnpm").exists());
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let err = digest_hex("md5", &mut &b"x"[..]).unwrap_err();
        assert!(matches!(err, RemoteError::UnsupportedAlgorithm(ref a) if a == "md5"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dest = tempfile::tempdir().unwrap();
        let d = descriptor_for(Path::new("/nonexistent/pnpm"), sha256_of(b""));
        let err = HttpFetcher::new().fetch(&d, dest.path()).unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[test]
    fn unsupported_scheme_is_config_error() {
        let dest = tempfile::tempdir().unwrap();
        let d = DependencyDescriptor::new("pnpm", "8.6.0", "sha256:00", "ftp://example.com/pnpm");
        assert!(matches!(
            HttpFetcher::new().fetch(&d, dest.path()),
            Err(RemoteError::Config(_))
        ));
    }

    fn fetch_tarball(data: &[u8], dest: &Path) -> Result<(), RemoteError> {
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("pnpm.tgz");
        fs::write(&artifact, data).unwrap();
        let mut d = descriptor_for(&artifact, sha256_of(data));
        d.strip_components = 1;
        HttpFetcher::new().fetch(&d, dest)
    }

    fn link_entry(
        builder: &mut tar::Builder<GzEncoder<Vec<u8>>>,
        kind: tar::EntryType,
        name: &str,
        target: &Path,
    ) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(kind);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, name, target).unwrap();
    }

    fn file_entry(builder: &mut tar::Builder<GzEncoder<Vec<u8>>>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }

    #[test]
    fn symlink_out_of_destination_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        link_entry(&mut builder, tar::EntryType::Symlink, "pkg/evil", outside.path());
        file_entry(&mut builder, "pkg/evil/owned.txt", b"owned");
        let data = builder.into_inner().unwrap().finish().unwrap();

        let dest = tempfile::tempdir().unwrap();
        let err = fetch_tarball(&data, dest.path()).unwrap_err();
        assert!(matches!(err, RemoteError::Archive(_)));
        assert!(!outside.path().join("owned.txt").exists());
    }

    #[test]
    fn relative_symlink_climbing_out_is_rejected() {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        link_entry(&mut builder, tar::EntryType::Symlink, "pkg/bin/up", Path::new("../../x"));
        let data = builder.into_inner().unwrap().finish().unwrap();

        let dest = tempfile::tempdir().unwrap();
        assert!(matches!(
            fetch_tarball(&data, dest.path()),
            Err(RemoteError::Archive(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn entries_are_not_written_through_existing_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dest.path().join("lib")).unwrap();

        let data = tarball(&[("pkg/lib/owned.txt", b"owned")]);
        assert!(matches!(
            fetch_tarball(&data, dest.path()),
            Err(RemoteError::Archive(_))
        ));
        assert!(!outside.path().join("owned.txt").exists());
    }

    #[test]
    fn links_inside_destination_are_kept() {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        file_entry(&mut builder, "pkg/dist/pnpm.cjs", b"js");
        link_entry(
            &mut builder,
            tar::EntryType::Symlink,
            "pkg/bin/pnpm",
            Path::new("../dist/pnpm.cjs"),
        );
        link_entry(
            &mut builder,
            tar::EntryType::Link,
            "pkg/dist/pnpm.js",
            Path::new("pkg/dist/pnpm.cjs"),
        );
        let data = builder.into_inner().unwrap().finish().unwrap();

        let dest = tempfile::tempdir().unwrap();
        fetch_tarball(&data, dest.path()).unwrap();
        assert_eq!(
            fs::read_link(dest.path().join("bin/pnpm")).unwrap(),
            PathBuf::from("../dist/pnpm.cjs")
        );
        assert_eq!(fs::read(dest.path().join("bin/pnpm")).unwrap(), b"js");
        assert_eq!(fs::read(dest.path().join("dist/pnpm.js")).unwrap(), b"js");
    }

    #[test]
    fn strip_path_rejects_parent_components() {
        assert!(strip_path(Path::new("../evil"), 0).is_err());
        assert_eq!(strip_path(Path::new("package"), 1).unwrap(), None);
        assert_eq!(
            strip_path(Path::new("./package/bin/x"), 1).unwrap(),
            Some(PathBuf::from("bin/x"))
        );
    }
}
