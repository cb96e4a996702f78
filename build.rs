//! 裸机构建: 汇编启动代码并指定链接脚本; 宿主机构建什么也不做

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=src/boot.S");
    println!("cargo:rerun-if-changed=linker.ld");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    cc::Build::new()
        .file("src/boot.S")
        .flag("-march=rv64gc")
        .flag("-mabi=lp64d")
        .compile("boot");

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    println!("cargo:rustc-link-arg-bins=-T{}/linker.ld", manifest_dir);
}
