//! Sources de documents CityGML : fichiers `.gml`, flux `.gml.bz2`, archives `.tar.bz2`
//!
//! Les documents dont l'encodage déclaré n'est pas UTF-8 sont décodés en mémoire
//! avec `encoding_rs` avant d'être passés au lecteur XML.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use encoding_rs::Encoding;
use memchr::memmem;
use tar::Archive;
use tracing::{debug, warn};

use crate::parser::BuildingReader;
use crate::CityGmlError;

/// Nombre d'octets inspectés pour trouver la déclaration XML
const PROLOG_SNIFF_LEN: usize = 512;

/// Nature d'un fichier d'entrée, d'après son nom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Document XML brut (`.gml`, `.xml`)
    Plain,
    /// Document compressé (`.gml.bz2`, `.xml.bz2`)
    Bzip2,
    /// Archive contenant un ou plusieurs documents (`.tar.bz2`)
    TarBz2,
}

impl InputKind {
    /// Détecte le type d'entrée depuis l'extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();

        if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".gml.bz2") || name.ends_with(".xml.bz2") {
            Some(Self::Bzip2)
        } else if name.ends_with(".gml") || name.ends_with(".xml") {
            Some(Self::Plain)
        } else {
            None
        }
    }
}

/// Un document CityGML prêt à être lu
#[derive(Debug)]
pub enum DocumentSource {
    /// Fichier sur disque, lu en flux
    File { path: PathBuf, kind: InputKind },
    /// Membre d'archive, déjà extrait en mémoire
    Memory { name: String, data: Vec<u8> },
}

impl DocumentSource {
    /// Nom affichable du document
    pub fn name(&self) -> String {
        match self {
            Self::File { path, .. } => path.display().to_string(),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    /// Ouvre un lecteur de bâtiments sur le document
    pub fn buildings(&self) -> Result<BuildingReader<Box<dyn BufRead + '_>>, CityGmlError> {
        let reader: Box<dyn BufRead + '_> = match self {
            Self::File { path, kind } => {
                let file = File::open(path)?;
                match kind {
                    InputKind::Bzip2 => utf8_reader(BufReader::new(BzDecoder::new(file)))?,
                    _ => utf8_reader(BufReader::new(file))?,
                }
            }
            Self::Memory { data, .. } => memory_reader(data)?,
        };

        Ok(BuildingReader::new(reader))
    }
}

/// Liste les documents d'un chemin (fichier ou dossier parcouru récursivement)
pub fn open(path: &Path) -> Result<Vec<DocumentSource>, CityGmlError> {
    let mut sources = Vec::new();

    if path.is_dir() {
        for input in collect_inputs(path)? {
            sources.extend(open_file(&input)?);
        }
    } else {
        sources.extend(open_file(path)?);
    }

    Ok(sources)
}

fn open_file(path: &Path) -> Result<Vec<DocumentSource>, CityGmlError> {
    match InputKind::from_path(path) {
        Some(InputKind::TarBz2) => extract(path),
        Some(kind) => Ok(vec![DocumentSource::File {
            path: path.to_path_buf(),
            kind,
        }]),
        None => Err(CityGmlError::UnsupportedInput(path.display().to_string())),
    }
}

/// Collecte récursivement les fichiers d'entrée reconnus
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>, CityGmlError> {
    let mut inputs = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry_path = entry?.path();

        if entry_path.is_dir() {
            inputs.extend(collect_inputs(&entry_path)?);
        } else if InputKind::from_path(&entry_path).is_some() {
            inputs.push(entry_path);
        }
    }

    // Ordre stable d'un système de fichiers à l'autre
    inputs.sort();
    Ok(inputs)
}

/// Extrait en mémoire les documents CityGML d'une archive `.tar.bz2`
pub fn extract(path: &Path) -> Result<Vec<DocumentSource>, CityGmlError> {
    let file = File::open(path)?;
    let mut archive = Archive::new(BzDecoder::new(file));
    let mut documents = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| CityGmlError::InvalidArchive(format!("{}: {}", path.display(), e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| CityGmlError::InvalidArchive(format!("{}: {}", path.display(), e)))?;
        let member = entry.path()?.to_string_lossy().into_owned();

        if !matches!(
            InputKind::from_path(Path::new(&member)),
            Some(InputKind::Plain)
        ) {
            debug!(member = member.as_str(), "Skipping archive member");
            continue;
        }

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        documents.push(DocumentSource::Memory {
            name: format!("{}!{}", path.display(), member),
            data,
        });
    }

    if documents.is_empty() {
        return Err(CityGmlError::MissingDocument(path.display().to_string()));
    }

    Ok(documents)
}

/// Retourne un flux UTF-8 : tel quel si le document l'est déjà, décodé sinon
fn utf8_reader<'a, R: BufRead + 'a>(mut reader: R) -> Result<Box<dyn BufRead + 'a>, CityGmlError> {
    let prolog = reader.fill_buf()?;
    let encoding = sniff_encoding(&prolog[..prolog.len().min(PROLOG_SNIFF_LEN)])?;

    if encoding == encoding_rs::UTF_8 {
        return Ok(Box::new(reader));
    }

    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    let decoded = decode_with_encoding(&data, encoding);
    Ok(Box::new(Cursor::new(decoded.into_bytes())))
}

/// Détecte l'encodage d'un document (BOM, puis attribut `encoding` du prologue)
pub fn sniff_encoding(prolog: &[u8]) -> Result<&'static Encoding, CityGmlError> {
    if let Some((encoding, _)) = Encoding::for_bom(prolog) {
        return Ok(encoding);
    }

    let Some(start) = memmem::find(prolog, b"<?xml") else {
        return Ok(encoding_rs::UTF_8);
    };
    let end = memmem::find(&prolog[start..], b"?>")
        .map(|p| start + p)
        .unwrap_or(prolog.len());
    let declaration = &prolog[start..end];

    let Some(pos) = memmem::find(declaration, b"encoding") else {
        return Ok(encoding_rs::UTF_8);
    };

    let rest = &declaration[pos + b"encoding".len()..];
    let label = rest
        .iter()
        .position(|&b| b == b'"' || b == b'\'')
        .and_then(|open| {
            let quote = rest[open];
            let value = &rest[open + 1..];
            value
                .iter()
                .position(|&b| b == quote)
                .map(|close| &value[..close])
        });

    match label {
        Some(label) => Encoding::for_label(label).ok_or_else(|| {
            CityGmlError::UnsupportedEncoding(String::from_utf8_lossy(label).into_owned())
        }),
        None => Ok(encoding_rs::UTF_8),
    }
}

/// Variante en mémoire : le contenu UTF-8 valide est lu sans copie
fn memory_reader(data: &[u8]) -> Result<Box<dyn BufRead + '_>, CityGmlError> {
    let encoding = sniff_encoding(&data[..data.len().min(PROLOG_SNIFF_LEN)])?;

    if encoding == encoding_rs::UTF_8 && simdutf8::basic::from_utf8(data).is_ok() {
        return Ok(Box::new(Cursor::new(data)));
    }

    let decoded = decode_with_encoding(data, encoding);
    Ok(Box::new(Cursor::new(decoded.into_bytes())))
}

/// Décode les bytes avec l'encodage détecté
fn decode_with_encoding(data: &[u8], encoding: &'static Encoding) -> String {
    if encoding == encoding_rs::UTF_8 {
        warn!("Document declared as UTF-8 contains invalid sequences, decoding lossily");
    }
    let (decoded, _, _) = encoding.decode(data);
    decoded.into_owned()
}
