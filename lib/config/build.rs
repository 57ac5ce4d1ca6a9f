use serde::Deserialize;
use std::{collections::BTreeMap, env, fs, path::PathBuf};

#[derive(Deserialize)]
struct FlagFile {
    #[serde(flatten)]
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let flags_path = PathBuf::from(manifest_dir.clone()).join("../../flags.json");
    let flags_str = fs::read_to_string(&flags_path).unwrap();
    let flags: FlagFile = serde_json::from_str(&flags_str).unwrap();
    make_flags(&flags);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../flags.json");
}

fn make_flags(flags: &FlagFile) {
    let mut s: String = String::from("");
    for (section, values) in &flags.sections {
        s += format!("#[allow(missing_docs)]\npub mod {} {{\n", section).as_str();
        for (key, value) in values {
            let value = value.trim().replace("_", "");
            if value.parse::<usize>().is_err() {
                panic!("Flag {}.{} is not an unsigned integer.", section, key);
            }
            s += format!("    pub const {}: usize = {};\n", key, value).as_str();
        }
        s += "}\n";
    }
    let out_dir = env::var("OUT_DIR").unwrap();
    let path = PathBuf::from(out_dir).join("build_flags.rs");
    fs::write(path, s).unwrap();
}
