use std::env;
use std::fs::File;
use std::path::PathBuf;

fn main() {
    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    println!("cargo:rerun-if-changed=src");

    let generated = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("HTTPC_H")
        .with_no_includes()
        .with_sys_include("stdint.h")
        .with_sys_include("stddef.h")
        .generate();

    let bindings = match generated {
        Ok(bindings) => bindings,
        Err(e) => {
            println!("cargo:warning=header not generated: {e}");
            return;
        }
    };

    let header = out_dir.join("httpc.h");
    match File::create(&header) {
        Ok(file) => bindings.write(file),
        Err(e) => println!("cargo:warning=cannot write {}: {e}", header.display()),
    }
}
