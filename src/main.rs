use std::process::ExitCode;

fn main() -> ExitCode {
    qml_runtime_lib::run()
}
