fn main() {
    mcserver_plugins_lib::run()
}
