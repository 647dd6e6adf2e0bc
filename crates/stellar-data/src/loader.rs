//! Data files on disk: locating a catalog file by base name, reading it in
//! whichever of RON, JSON or TOML it is written in, and the name tables
//! [`crate::resolve`] builds while assigning ids.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

/// Why a catalog directory could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// One catalog file exists in more than one format.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    #[error("requirement cycle involving '{name}'")]
    RequirementCycle { name: String },

    /// A number the engine cannot represent, or a growth factor that
    /// would make costs shrink.
    #[error("invalid value for {field} of '{name}': {detail}")]
    InvalidValue {
        name: String,
        field: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Catalog(#[from] stellar_core::catalog::CatalogError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Ron,
    Json,
    Toml,
}

impl Format {
    /// Search order when locating a file by base name.
    const ALL: [(Format, &'static str); 3] = [(Format::Ron, "ron"), (Format::Toml, "toml"), (Format::Json, "json")];

    fn of(path: &Path) -> Result<Format, DataLoadError> {
        let ext = path.extension().and_then(|e| e.to_str());
        Format::ALL
            .iter()
            .find(|(_, known)| Some(*known) == ext)
            .map(|(format, _)| *format)
            .ok_or_else(|| DataLoadError::UnsupportedFormat {
                file: path.to_path_buf(),
            })
    }
}

/// The `base` file in `dir` in any supported format, if there is one.
/// Two formats of the same file are ambiguous and rejected.
pub fn find_data_file(dir: &Path, base: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut present = Format::ALL
        .iter()
        .map(|(_, ext)| dir.join(format!("{base}.{ext}")))
        .filter(|path| path.is_file());
    let first = present.next();
    if let (Some(a), Some(b)) = (&first, present.next()) {
        return Err(DataLoadError::ConflictingFormats { a: a.clone(), b });
    }
    Ok(first)
}

pub fn require_data_file(dir: &Path, base: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base.to_string(),
        dir: dir.to_path_buf(),
    })
}

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a single document such as `balance`.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let text = fs::read_to_string(path)?;
    match Format::of(path)? {
        Format::Ron => ron::from_str(&text).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&text).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&text).map_err(|e| parse_error(path, e)),
    }
}

/// Read a list of entries. RON and JSON files hold the list itself; a
/// TOML file holds it as an array of tables under `key`, e.g.
/// `[[research]]`.
pub fn deserialize_list<T: DeserializeOwned>(path: &Path, key: &str) -> Result<Vec<T>, DataLoadError> {
    if Format::of(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let mut table: toml::Table = deserialize_file(path)?;
    let entries = table
        .remove(key)
        .ok_or_else(|| parse_error(path, format!("no [[{key}]] entries")))?;
    entries.try_into().map_err(|e: toml::de::Error| parse_error(path, e))
}

/// Look up `name` among the entries registered so far.
pub fn resolve_name<'a, V>(
    names: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    names.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Register `name` for `value`; names must be unique across the table.
pub fn assign_name<V>(
    names: &mut HashMap<String, V>,
    name: &str,
    value: V,
    file: &Path,
) -> Result<(), DataLoadError> {
    match names.entry(name.to_string()) {
        Entry::Occupied(_) => Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BalanceData, BuildingData, ResearchData, UnitData};

    // Helpers ---------------------------------------------------------------

    fn classic_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join("classic")
    }

    /// A scratch copy of the classic data set.
    fn classic_copy(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stellar_loader_test_{suffix}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for entry in fs::read_dir(classic_dir()).unwrap() {
            let path = entry.unwrap().path();
            fs::copy(&path, dir.join(path.file_name().unwrap())).unwrap();
        }
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    // -----------------------------------------------------------------------
    // Test 1: The shipped files parse in their own formats
    // -----------------------------------------------------------------------
    #[test]
    fn classic_files_parse_in_each_format() {
        let dir = classic_dir();
        let buildings: Vec<BuildingData> =
            deserialize_list(&require_data_file(&dir, "buildings").unwrap(), "buildings").unwrap();
        assert_eq!(buildings[0].name, "metal_mine");

        let research_file = require_data_file(&dir, "research").unwrap();
        assert!(research_file.ends_with("research.toml"));
        let research: Vec<ResearchData> = deserialize_list(&research_file, "research").unwrap();
        assert_eq!(research[0].name, "energy_technology");
        assert_eq!(research[1].requires.len(), 2);

        let units: Vec<UnitData> = deserialize_list(&require_data_file(&dir, "units").unwrap(), "units").unwrap();
        assert_eq!(units[0].name, "small_cargo");
        assert_eq!(units[0].rapid_fire, vec![("espionage_probe".to_string(), 5)]);

        let balance: BalanceData = deserialize_file(&require_data_file(&dir, "balance").unwrap()).unwrap();
        assert_eq!(balance.universe_speed, Some(1));
        assert_eq!(balance.combat.and_then(|c| c.max_rounds), Some(6));
    }

    // -----------------------------------------------------------------------
    // Test 2: Ambiguous or absent files
    // -----------------------------------------------------------------------
    #[test]
    fn balance_in_two_formats_is_ambiguous() {
        let dir = classic_copy("conflict");
        fs::write(dir.join("balance.ron"), "(universe_speed: Some(2))").unwrap();
        let err = find_data_file(&dir, "balance").unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::ConflictingFormats { ref a, ref b }
                if a.ends_with("balance.ron") && b.ends_with("balance.toml")
        ));
        assert!(matches!(
            crate::resolve::load_game_data(&dir),
            Err(DataLoadError::ConflictingFormats { .. })
        ));

        fs::remove_file(dir.join("balance.ron")).unwrap();
        assert!(crate::resolve::load_catalog(&dir).is_ok());
        cleanup(&dir);
    }

    #[test]
    fn missing_units_file_names_the_directory() {
        let dir = classic_copy("no_units");
        fs::remove_file(dir.join("units.ron")).unwrap();
        assert_eq!(find_data_file(&dir, "units").unwrap(), None);
        assert!(matches!(
            require_data_file(&dir, "units"),
            Err(DataLoadError::MissingRequired { ref file, dir: ref in_dir }) if file == "units" && *in_dir == dir
        ));
        // Balance stays optional.
        fs::remove_file(dir.join("balance.toml")).unwrap();
        assert_eq!(find_data_file(&dir, "balance").unwrap(), None);
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Test 3: Broken files report where they failed
    // -----------------------------------------------------------------------
    #[test]
    fn toml_list_under_the_wrong_key_is_a_parse_error() {
        let dir = classic_copy("wrong_key");
        let path = dir.join("research.toml");
        let renamed = fs::read_to_string(&path).unwrap().replace("[[research]]", "[[topics]]");
        fs::write(&path, renamed).unwrap();

        let err = deserialize_list::<ResearchData>(&path, "research").unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::Parse { ref file, ref detail } if *file == path && detail.contains("[[research]]")
        ));
        cleanup(&dir);
    }

    #[test]
    fn malformed_units_are_reported_with_their_file() {
        let dir = classic_copy("malformed");
        let path = dir.join("units.ron");
        fs::write(&path, r#"[(name: "small_cargo", weapon: "heavy")]"#).unwrap();
        assert!(matches!(
            deserialize_list::<UnitData>(&path, "units"),
            Err(DataLoadError::Parse { ref file, .. }) if *file == path
        ));

        let yaml = dir.join("units.yaml");
        fs::write(&yaml, "- name: small_cargo").unwrap();
        assert!(matches!(
            deserialize_list::<UnitData>(&yaml, "units"),
            Err(DataLoadError::UnsupportedFormat { ref file }) if *file == yaml
        ));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Test 4: Name tables
    // -----------------------------------------------------------------------
    #[test]
    fn names_are_unique_and_resolvable() {
        let file = classic_dir().join("units.ron");
        let mut names = HashMap::new();
        assign_name(&mut names, "small_cargo", 0u32, &file).unwrap();
        assign_name(&mut names, "espionage_probe", 1u32, &file).unwrap();
        assert!(matches!(
            assign_name(&mut names, "small_cargo", 2u32, &file),
            Err(DataLoadError::DuplicateName { ref name, .. }) if name == "small_cargo"
        ));
        assert_eq!(names["small_cargo"], 0);

        assert_eq!(resolve_name(&names, "espionage_probe", &file, "unit").unwrap(), &1);
        assert!(matches!(
            resolve_name(&names, "death_star", &file, "unit"),
            Err(DataLoadError::UnresolvedRef { expected_kind: "unit", ref name, .. }) if name == "death_star"
        ));
    }
}
