mod app;
mod camera;
mod input;
mod renderer;
mod settings;

fn main() {
    app::run();
}
