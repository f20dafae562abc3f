// Stamps the build time into the binary for `pgkeep-cli --version`

fn main() {
    let built_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z");
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", built_at);
}
