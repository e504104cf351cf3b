fn main() {
    heat_bracket_lib::run()
}
