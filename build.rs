fn main() {
    println!("cargo:rerun-if-env-changed=BREWBRICK_CONFIG");

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
